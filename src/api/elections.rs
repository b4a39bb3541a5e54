use mongodb::{bson::doc, Client};
use rocket::{futures::TryStreamExt, serde::json::Json, Route};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        auth::AuthToken,
        election::{ElectionDescription, ElectionSpec},
    },
    db::{Admin, Election, ElectionState, NewElection, Question, QuestionOption, Vote, Voter},
    mongodb::{Coll, Id},
};

pub fn routes() -> Vec<Route> {
    routes![
        get_elections,
        create_election,
        get_election,
        update_election,
        start_election,
        end_election,
        delete_election,
    ]
}

/// Fetch the given election, checking that the authenticated admin owns it.
pub(crate) async fn owned_election(
    election_id: Id,
    token: &AuthToken<Admin>,
    elections: &Coll<Election>,
) -> Result<Election> {
    let election = elections
        .find_one(election_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election {election_id}")))?;
    if election.admin_id != token.id {
        return Err(Error::Forbidden(format!(
            "Election {election_id} belongs to a different admin"
        )));
    }
    Ok(election)
}

/// List the authenticated admin's elections.
#[get("/elections")]
pub(crate) async fn get_elections(
    token: AuthToken<Admin>,
    elections: Coll<Election>,
) -> Result<Json<Vec<ElectionDescription>>> {
    let elections: Vec<_> = elections
        .find(doc! { "admin_id": token.id }, None)
        .await?
        .map_ok(ElectionDescription::from)
        .try_collect()
        .await?;
    Ok(Json(elections))
}

/// Create a new election in the Draft state.
#[post("/elections", data = "<spec>", format = "json")]
pub(crate) async fn create_election(
    token: AuthToken<Admin>,
    spec: Json<ElectionSpec>,
    elections: Coll<NewElection>,
) -> Result<Json<ElectionDescription>> {
    let new_election = spec
        .into_inner()
        .into_election(token.id)
        .map_err(Error::BadRequest)?;
    let new_id: Id = elections
        .insert_one(&new_election, None)
        .await?
        .inserted_id
        .as_object_id()
        .expect("Mongo always assigns an ObjectId")
        .into();
    Ok(Json(
        Election {
            id: new_id,
            election: new_election,
        }
        .into(),
    ))
}

/// Get a single election the authenticated admin owns.
#[get("/elections/<election_id>")]
pub(crate) async fn get_election(
    token: AuthToken<Admin>,
    election_id: Id,
    elections: Coll<Election>,
) -> Result<Json<ElectionDescription>> {
    let election = owned_election(election_id, &token, &elections).await?;
    Ok(Json(election.into()))
}

/// Rename an election. Allowed in any state.
#[put("/elections/<election_id>", data = "<spec>", format = "json")]
pub(crate) async fn update_election(
    token: AuthToken<Admin>,
    election_id: Id,
    spec: Json<ElectionSpec>,
    elections: Coll<Election>,
) -> Result<Json<ElectionDescription>> {
    let mut election = owned_election(election_id, &token, &elections).await?;
    let spec = spec.into_inner();
    if spec.name.trim().is_empty() {
        return Err(Error::BadRequest("Election name must not be empty".to_string()));
    }
    elections
        .update_one(
            election_id.as_doc(),
            doc! { "$set": { "name": &spec.name } },
            None,
        )
        .await?;
    election.election.name = spec.name;
    Ok(Json(election.into()))
}

/// Open an election for voting. Only valid from the Draft state.
#[post("/elections/<election_id>/start")]
pub(crate) async fn start_election(
    token: AuthToken<Admin>,
    election_id: Id,
    elections: Coll<Election>,
) -> Result<()> {
    owned_election(election_id, &token, &elections).await?;

    // The filter makes the transition atomic: a concurrent start loses here.
    let result = elections
        .update_one(
            doc! { "_id": election_id, "started": false },
            doc! { "$set": { "started": true } },
            None,
        )
        .await?;
    if result.modified_count != 1 {
        return Err(Error::BadRequest(format!(
            "Election {election_id} has already started"
        )));
    }
    info!("Election {election_id} started");
    Ok(())
}

/// Close an election. Only valid from the Open state.
#[post("/elections/<election_id>/end")]
pub(crate) async fn end_election(
    token: AuthToken<Admin>,
    election_id: Id,
    elections: Coll<Election>,
) -> Result<()> {
    let election = owned_election(election_id, &token, &elections).await?;
    match election.state() {
        ElectionState::Draft => {
            return Err(Error::BadRequest(format!(
                "Election {election_id} cannot end before it has started"
            )))
        }
        ElectionState::Closed => {
            return Err(Error::BadRequest(format!(
                "Election {election_id} has already ended"
            )))
        }
        ElectionState::Open => {}
    }

    let result = elections
        .update_one(
            doc! { "_id": election_id, "started": true, "ended": false },
            doc! { "$set": { "ended": true } },
            None,
        )
        .await?;
    if result.modified_count != 1 {
        return Err(Error::BadRequest(format!(
            "Election {election_id} has already ended"
        )));
    }
    info!("Election {election_id} ended");
    Ok(())
}

/// Delete an election and everything under it.
#[delete("/elections/<election_id>")]
pub(crate) async fn delete_election(
    token: AuthToken<Admin>,
    election_id: Id,
    client: &rocket::State<Client>,
    elections: Coll<Election>,
    questions: Coll<Question>,
    options: Coll<QuestionOption>,
    voters: Coll<Voter>,
    votes: Coll<Vote>,
) -> Result<()> {
    owned_election(election_id, &token, &elections).await?;

    // Cascade in a transaction so a failure cannot orphan half the data.
    let mut session = client.start_session(None).await?;
    session.start_transaction(None).await?;

    let question_ids: Vec<Id> = questions
        .find_with_session(doc! { "election_id": election_id }, None, &mut session)
        .await?
        .stream(&mut session)
        .map_ok(|question| question.id)
        .try_collect()
        .await?;

    options
        .delete_many_with_session(
            doc! { "question_id": { "$in": question_ids } },
            None,
            &mut session,
        )
        .await?;
    questions
        .delete_many_with_session(doc! { "election_id": election_id }, None, &mut session)
        .await?;
    voters
        .delete_many_with_session(doc! { "election_id": election_id }, None, &mut session)
        .await?;
    votes
        .delete_many_with_session(doc! { "election_id": election_id }, None, &mut session)
        .await?;
    elections
        .delete_one_with_session(election_id.as_doc(), None, &mut session)
        .await?;

    session.commit_transaction().await?;
    info!("Election {election_id} deleted");
    Ok(())
}
