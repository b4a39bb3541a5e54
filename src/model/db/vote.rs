use std::ops::{Deref, DerefMut};

use mongodb::bson::doc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::mongodb::{Coll, Id};

/// Core vote data: one voter's choice on one question.
///
/// The unique index on `(election_id, question_id, voter_id)` is the hard
/// guarantee that a voter answers each question at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCore {
    pub election_id: Id,
    pub question_id: Id,
    pub option_id: Id,
    /// The database ID of the voter, not their external `voter_id` string.
    pub voter_id: Id,
}

/// A vote without an ID.
pub type NewVote = VoteCore;

/// A vote from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}

impl DerefMut for Vote {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.vote
    }
}

/// Has this voter cast any vote in this election?
/// Election-wide by design: a ballot is submitted in one shot, so a single
/// existing vote means the whole ballot was already cast.
pub async fn have_already_voted(
    votes: &Coll<Vote>,
    election_id: Id,
    voter_id: Id,
) -> Result<bool> {
    let filter = doc! {
        "election_id": election_id,
        "voter_id": voter_id,
    };
    Ok(votes.find_one(filter, None).await?.is_some())
}

#[cfg(test)]
mod tests {
    use mongodb::Database;

    use crate::model::mongodb::is_duplicate_key_error;

    use super::*;

    #[backend_test]
    async fn duplicate_votes_rejected(_db: Database, votes: Coll<NewVote>) {
        let vote = NewVote {
            election_id: Id::new(),
            question_id: Id::new(),
            option_id: Id::new(),
            voter_id: Id::new(),
        };

        votes
            .insert_one(&vote, None)
            .await
            .expect("First insert should succeed");
        let err = votes
            .insert_one(&vote, None)
            .await
            .expect_err("Second insert should violate the unique index");
        assert!(is_duplicate_key_error(&err));
    }
}
