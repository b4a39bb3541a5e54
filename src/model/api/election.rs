use serde::{Deserialize, Serialize};

use crate::model::db::{
    Election, ElectionState, NewElection, NewQuestion, NewQuestionOption, Question,
    QuestionOption, Voter,
};
use crate::model::mongodb::Id;

use super::id::ApiId;

/// An election as specified by an admin creating or renaming one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSpec {
    pub name: String,
}

impl ElectionSpec {
    /// Convert into a new election owned by the given admin.
    pub fn into_election(self, admin_id: Id) -> Result<NewElection, String> {
        if self.name.trim().is_empty() {
            return Err("Election name must not be empty".to_string());
        }
        Ok(NewElection::new(self.name, admin_id))
    }
}

/// A question as specified by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl QuestionSpec {
    pub fn into_question(self, election_id: Id) -> Result<NewQuestion, String> {
        if self.title.trim().is_empty() {
            return Err("Question title must not be empty".to_string());
        }
        Ok(NewQuestion {
            election_id,
            title: self.title,
            description: self.description,
        })
    }
}

/// An option as specified by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionSpec {
    pub title: String,
}

impl OptionSpec {
    pub fn into_option(self, question_id: Id) -> Result<NewQuestionOption, String> {
        if self.title.trim().is_empty() {
            return Err("Option title must not be empty".to_string());
        }
        Ok(NewQuestionOption {
            question_id,
            title: self.title,
        })
    }
}

/// A summary of an election, as listed to its owning admin.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDescription {
    pub id: ApiId,
    pub name: String,
    pub state: ElectionState,
}

impl From<Election> for ElectionDescription {
    fn from(election: Election) -> Self {
        let state = election.state();
        Self {
            id: election.id.into(),
            name: election.election.name,
            state,
        }
    }
}

/// An option as rendered in a ballot.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionView {
    pub id: ApiId,
    pub title: String,
}

impl From<QuestionOption> for OptionView {
    fn from(option: QuestionOption) -> Self {
        Self {
            id: option.id.into(),
            title: option.option.title,
        }
    }
}

/// A question with its options, as rendered in a ballot.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: ApiId,
    pub title: String,
    pub description: String,
    pub options: Vec<OptionView>,
}

/// The full ballot structure of an election.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotView {
    pub id: ApiId,
    pub name: String,
    pub state: ElectionState,
    pub questions: Vec<QuestionView>,
}

impl BallotView {
    /// Assemble the ballot from its separately-fetched parts, attaching each
    /// option to its question.
    pub fn new(election: Election, questions: Vec<Question>, options: Vec<QuestionOption>) -> Self {
        let state = election.state();
        let questions = questions
            .into_iter()
            .map(|question| {
                let options = options
                    .iter()
                    .filter(|option| option.question_id == question.id)
                    .map(|option| OptionView {
                        id: option.id.into(),
                        title: option.option.title.clone(),
                    })
                    .collect();
                QuestionView {
                    id: question.id.into(),
                    title: question.question.title,
                    description: question.question.description,
                    options,
                }
            })
            .collect();
        Self {
            id: election.id.into(),
            name: election.election.name,
            state,
            questions,
        }
    }
}

/// A registered voter, as listed to the owning admin.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterSummary {
    pub id: ApiId,
    pub voter_id: String,
    pub has_voted: bool,
}

impl VoterSummary {
    pub fn new(voter: Voter, has_voted: bool) -> Self {
        Self {
            id: voter.id.into(),
            voter_id: voter.voter.voter_id,
            has_voted,
        }
    }
}

/// The admin's view of an election: the full ballot plus the voter roll.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotDetails {
    #[serde(flatten)]
    pub ballot: BallotView,
    pub voters: Vec<VoterSummary>,
}

#[cfg(test)]
mod examples {
    use super::*;

    impl ElectionSpec {
        pub fn example() -> Self {
            Self {
                name: "Student Union Elections 2026".to_string(),
            }
        }
    }

    impl QuestionSpec {
        pub fn example() -> Self {
            Self {
                title: "Who should be president?".to_string(),
                description: "Vote for one candidate.".to_string(),
            }
        }
    }

    impl OptionSpec {
        pub fn example() -> Self {
            Self {
                title: "Parry Hotter".to_string(),
            }
        }

        pub fn example2() -> Self {
            Self {
                title: "Rita Skeeter".to_string(),
            }
        }
    }
}
