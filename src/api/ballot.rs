use mongodb::{bson::doc, Client};
use rocket::{futures::TryStreamExt, serde::json::Json, Route};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        auth::AuthToken,
        election::{
            BallotDetails, OptionSpec, OptionView, QuestionSpec, QuestionView,
            VoterSummary,
        },
        voter::VoterSpec,
    },
    db::{
        Admin, Election, ElectionState, NewQuestion, NewQuestionOption, NewVoter, Question,
        QuestionOption, Vote, Voter,
    },
    mongodb::{is_duplicate_key_error, Coll, Id},
};

use super::elections::owned_election;

pub fn routes() -> Vec<Route> {
    routes![
        get_ballot,
        create_question,
        get_question,
        update_question,
        delete_question,
        create_option,
        update_option,
        delete_option,
        create_voter,
        get_voter,
        delete_voter,
    ]
}

/// Fetch the given owned election, further checking that its ballot is still
/// editable.
async fn owned_draft_election(
    election_id: Id,
    token: &AuthToken<Admin>,
    elections: &Coll<Election>,
) -> Result<Election> {
    let election = owned_election(election_id, token, elections).await?;
    if election.state() != ElectionState::Draft {
        return Err(Error::BadRequest(format!(
            "Cannot modify the ballot of election {election_id} once it has started"
        )));
    }
    Ok(election)
}

/// Fetch the given question, checking it belongs to the given election.
async fn question_in_election(
    election_id: Id,
    question_id: Id,
    questions: &Coll<Question>,
) -> Result<Question> {
    questions
        .find_one(doc! { "_id": question_id, "election_id": election_id }, None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Question {question_id}")))
}

/// The owning admin's full view of an election: ballot plus voter roll.
#[get("/elections/<election_id>/ballot")]
pub(crate) async fn get_ballot(
    token: AuthToken<Admin>,
    election_id: Id,
    elections: Coll<Election>,
    questions: Coll<Question>,
    options: Coll<QuestionOption>,
    voters: Coll<Voter>,
    votes: Coll<Vote>,
) -> Result<Json<BallotDetails>> {
    let election = owned_election(election_id, &token, &elections).await?;
    let ballot = super::public::ballot_view(election, &questions, &options).await?;

    let election_voters: Vec<Voter> = voters
        .find(doc! { "election_id": election_id }, None)
        .await?
        .try_collect()
        .await?;
    let mut summaries = Vec::with_capacity(election_voters.len());
    for voter in election_voters {
        let has_voted =
            crate::model::db::have_already_voted(&votes, election_id, voter.id).await?;
        summaries.push(VoterSummary::new(voter, has_voted));
    }

    Ok(Json(BallotDetails {
        ballot,
        voters: summaries,
    }))
}

/// Add a question to a draft election's ballot.
#[post("/elections/<election_id>/questions", data = "<spec>", format = "json")]
pub(crate) async fn create_question(
    token: AuthToken<Admin>,
    election_id: Id,
    spec: Json<QuestionSpec>,
    elections: Coll<Election>,
    questions: Coll<NewQuestion>,
) -> Result<Json<QuestionView>> {
    owned_draft_election(election_id, &token, &elections).await?;
    let new_question = spec
        .into_inner()
        .into_question(election_id)
        .map_err(Error::BadRequest)?;
    let new_id: Id = questions
        .insert_one(&new_question, None)
        .await?
        .inserted_id
        .as_object_id()
        .expect("Mongo always assigns an ObjectId")
        .into();
    Ok(Json(QuestionView {
        id: new_id.into(),
        title: new_question.title,
        description: new_question.description,
        options: Vec::new(),
    }))
}

/// Get a question with its options.
#[get("/elections/<election_id>/questions/<question_id>")]
pub(crate) async fn get_question(
    token: AuthToken<Admin>,
    election_id: Id,
    question_id: Id,
    elections: Coll<Election>,
    questions: Coll<Question>,
    options: Coll<QuestionOption>,
) -> Result<Json<QuestionView>> {
    owned_election(election_id, &token, &elections).await?;
    let question = question_in_election(election_id, question_id, &questions).await?;
    let options: Vec<_> = options
        .find(doc! { "question_id": question_id }, None)
        .await?
        .map_ok(OptionView::from)
        .try_collect()
        .await?;
    Ok(Json(QuestionView {
        id: question.id.into(),
        title: question.question.title,
        description: question.question.description,
        options,
    }))
}

/// Rewrite a question's title and description.
#[put(
    "/elections/<election_id>/questions/<question_id>",
    data = "<spec>",
    format = "json"
)]
pub(crate) async fn update_question(
    token: AuthToken<Admin>,
    election_id: Id,
    question_id: Id,
    spec: Json<QuestionSpec>,
    elections: Coll<Election>,
    questions: Coll<Question>,
) -> Result<()> {
    owned_draft_election(election_id, &token, &elections).await?;
    question_in_election(election_id, question_id, &questions).await?;
    let spec = spec.into_inner();
    if spec.title.trim().is_empty() {
        return Err(Error::BadRequest("Question title must not be empty".to_string()));
    }
    questions
        .update_one(
            question_id.as_doc(),
            doc! { "$set": { "title": &spec.title, "description": &spec.description } },
            None,
        )
        .await?;
    Ok(())
}

/// Remove a question and its options from the ballot.
#[delete("/elections/<election_id>/questions/<question_id>")]
pub(crate) async fn delete_question(
    token: AuthToken<Admin>,
    election_id: Id,
    question_id: Id,
    client: &rocket::State<Client>,
    elections: Coll<Election>,
    questions: Coll<Question>,
    options: Coll<QuestionOption>,
) -> Result<()> {
    owned_draft_election(election_id, &token, &elections).await?;
    question_in_election(election_id, question_id, &questions).await?;

    let mut session = client.start_session(None).await?;
    session.start_transaction(None).await?;
    options
        .delete_many_with_session(doc! { "question_id": question_id }, None, &mut session)
        .await?;
    questions
        .delete_one_with_session(question_id.as_doc(), None, &mut session)
        .await?;
    session.commit_transaction().await?;
    Ok(())
}

/// Add an option to a question.
#[post(
    "/elections/<election_id>/questions/<question_id>/options",
    data = "<spec>",
    format = "json"
)]
pub(crate) async fn create_option(
    token: AuthToken<Admin>,
    election_id: Id,
    question_id: Id,
    spec: Json<OptionSpec>,
    elections: Coll<Election>,
    questions: Coll<Question>,
    options: Coll<NewQuestionOption>,
) -> Result<Json<OptionView>> {
    owned_draft_election(election_id, &token, &elections).await?;
    question_in_election(election_id, question_id, &questions).await?;
    let new_option = spec
        .into_inner()
        .into_option(question_id)
        .map_err(Error::BadRequest)?;
    let new_id: Id = options
        .insert_one(&new_option, None)
        .await?
        .inserted_id
        .as_object_id()
        .expect("Mongo always assigns an ObjectId")
        .into();
    Ok(Json(OptionView {
        id: new_id.into(),
        title: new_option.title,
    }))
}

/// Rewrite an option's title.
#[put(
    "/elections/<election_id>/questions/<question_id>/options/<option_id>",
    data = "<spec>",
    format = "json"
)]
pub(crate) async fn update_option(
    token: AuthToken<Admin>,
    election_id: Id,
    question_id: Id,
    option_id: Id,
    spec: Json<OptionSpec>,
    elections: Coll<Election>,
    questions: Coll<Question>,
    options: Coll<QuestionOption>,
) -> Result<()> {
    owned_draft_election(election_id, &token, &elections).await?;
    question_in_election(election_id, question_id, &questions).await?;
    let spec = spec.into_inner();
    if spec.title.trim().is_empty() {
        return Err(Error::BadRequest("Option title must not be empty".to_string()));
    }
    let result = options
        .update_one(
            doc! { "_id": option_id, "question_id": question_id },
            doc! { "$set": { "title": &spec.title } },
            None,
        )
        .await?;
    if result.matched_count != 1 {
        return Err(Error::not_found(format!("Option {option_id}")));
    }
    Ok(())
}

/// Remove an option from a question.
#[delete("/elections/<election_id>/questions/<question_id>/options/<option_id>")]
pub(crate) async fn delete_option(
    token: AuthToken<Admin>,
    election_id: Id,
    question_id: Id,
    option_id: Id,
    elections: Coll<Election>,
    questions: Coll<Question>,
    options: Coll<QuestionOption>,
) -> Result<()> {
    owned_draft_election(election_id, &token, &elections).await?;
    question_in_election(election_id, question_id, &questions).await?;
    let result = options
        .delete_one(doc! { "_id": option_id, "question_id": question_id }, None)
        .await?;
    if result.deleted_count != 1 {
        return Err(Error::not_found(format!("Option {option_id}")));
    }
    Ok(())
}

/// Register a voter under an election. Allowed until the election closes.
#[post("/elections/<election_id>/voters", data = "<spec>", format = "json")]
pub(crate) async fn create_voter(
    token: AuthToken<Admin>,
    election_id: Id,
    spec: Json<VoterSpec>,
    elections: Coll<Election>,
    voters: Coll<NewVoter>,
) -> Result<Json<VoterSummary>> {
    let election = owned_election(election_id, &token, &elections).await?;
    if election.state() == ElectionState::Closed {
        return Err(Error::BadRequest(format!(
            "Cannot register voters for election {election_id} after it has ended"
        )));
    }

    let new_voter = spec
        .into_inner()
        .into_voter(election_id)
        .map_err(Error::BadRequest)?;
    let new_id: Id = match voters.insert_one(&new_voter, None).await {
        Ok(result) => result
            .inserted_id
            .as_object_id()
            .expect("Mongo always assigns an ObjectId")
            .into(),
        Err(err) if is_duplicate_key_error(&err) => {
            return Err(Error::BadRequest(format!(
                "Voter ID '{}' is already registered for this election",
                new_voter.voter_id
            )))
        }
        Err(err) => return Err(err.into()),
    };

    Ok(Json(VoterSummary::new(
        Voter {
            id: new_id,
            voter: new_voter,
        },
        false,
    )))
}

/// Look up a registered voter.
#[get("/elections/<election_id>/voters/<voter_id>")]
pub(crate) async fn get_voter(
    token: AuthToken<Admin>,
    election_id: Id,
    voter_id: Id,
    elections: Coll<Election>,
    voters: Coll<Voter>,
    votes: Coll<Vote>,
) -> Result<Json<VoterSummary>> {
    owned_election(election_id, &token, &elections).await?;
    let voter = voters
        .find_one(doc! { "_id": voter_id, "election_id": election_id }, None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Voter {voter_id}")))?;
    let has_voted =
        crate::model::db::have_already_voted(&votes, election_id, voter.id).await?;
    Ok(Json(VoterSummary::new(voter, has_voted)))
}

/// Remove a voter, along with any votes they have cast. Once the election
/// closes the ledger is final, so the voter roll can no longer be edited.
#[delete("/elections/<election_id>/voters/<voter_id>")]
pub(crate) async fn delete_voter(
    token: AuthToken<Admin>,
    election_id: Id,
    voter_id: Id,
    client: &rocket::State<Client>,
    elections: Coll<Election>,
    voters: Coll<Voter>,
    votes: Coll<Vote>,
) -> Result<()> {
    let election = owned_election(election_id, &token, &elections).await?;
    if election.state() == ElectionState::Closed {
        return Err(Error::BadRequest(format!(
            "Cannot remove voters from election {election_id} after it has ended"
        )));
    }

    let mut session = client.start_session(None).await?;
    session.start_transaction(None).await?;
    let result = voters
        .delete_one_with_session(
            doc! { "_id": voter_id, "election_id": election_id },
            None,
            &mut session,
        )
        .await?;
    if result.deleted_count != 1 {
        session.abort_transaction().await?;
        return Err(Error::not_found(format!("Voter {voter_id}")));
    }
    votes
        .delete_many_with_session(
            doc! { "election_id": election_id, "voter_id": voter_id },
            None,
            &mut session,
        )
        .await?;
    session.commit_transaction().await?;
    Ok(())
}
