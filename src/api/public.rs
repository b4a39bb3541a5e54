use std::collections::{HashMap, HashSet};

use mongodb::{bson::doc, Client};
use rocket::{futures::TryStreamExt, serde::json::Json, Route};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        auth::AuthToken,
        ballot::{CastReceipt, CastRequest, VoterBallot},
        election::BallotView,
    },
    db::{have_already_voted, Election, ElectionState, NewVote, Question, QuestionOption, Vote, Voter},
    mongodb::{is_duplicate_key_error, Coll, Id},
};

pub fn routes() -> Vec<Route> {
    routes![ballot_landing, vote_form, cast_vote]
}

/// Fetch the given election if voters are allowed to see it, i.e. it has
/// started.
async fn visible_election(election_id: Id, elections: &Coll<Election>) -> Result<Election> {
    let election = elections
        .find_one(election_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election {election_id}")))?;
    if election.state() == ElectionState::Draft {
        return Err(Error::Forbidden(format!(
            "Election {election_id} is yet to start"
        )));
    }
    Ok(election)
}

/// Assemble the full ballot of an election.
pub(crate) async fn ballot_view(
    election: Election,
    questions: &Coll<Question>,
    options: &Coll<QuestionOption>,
) -> Result<BallotView> {
    let election_questions: Vec<Question> = questions
        .find(doc! { "election_id": election.id }, None)
        .await?
        .try_collect()
        .await?;
    let question_ids: Vec<Id> = election_questions.iter().map(|q| q.id).collect();
    let question_options: Vec<QuestionOption> = options
        .find(doc! { "question_id": { "$in": question_ids } }, None)
        .await?
        .try_collect()
        .await?;
    Ok(BallotView::new(election, election_questions, question_options))
}

/// Fetch the authenticated voter, checking they belong to this election.
async fn voter_for_election(
    election_id: Id,
    token: &AuthToken<Voter>,
    voters: &Coll<Voter>,
) -> Result<Voter> {
    let voter = voters
        .find_one(token.id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Voter {}", token.id)))?;
    if voter.election_id != election_id {
        return Err(Error::Forbidden(format!(
            "You are not registered for election {election_id}"
        )));
    }
    Ok(voter)
}

/// The public landing page data for a started election.
#[get("/public/<election_id>")]
pub(crate) async fn ballot_landing(
    election_id: Id,
    elections: Coll<Election>,
    questions: Coll<Question>,
    options: Coll<QuestionOption>,
) -> Result<Json<BallotView>> {
    let election = visible_election(election_id, &elections).await?;
    Ok(Json(ballot_view(election, &questions, &options).await?))
}

/// The authenticated voter's view of the ballot.
#[get("/public/<election_id>/vote")]
pub(crate) async fn vote_form(
    token: AuthToken<Voter>,
    election_id: Id,
    elections: Coll<Election>,
    questions: Coll<Question>,
    options: Coll<QuestionOption>,
    voters: Coll<Voter>,
    votes: Coll<Vote>,
) -> Result<Json<VoterBallot>> {
    let election = visible_election(election_id, &elections).await?;
    let voter = voter_for_election(election_id, &token, &voters).await?;
    let has_voted = have_already_voted(&votes, election_id, voter.id).await?;
    Ok(Json(VoterBallot {
        ballot: ballot_view(election, &questions, &options).await?,
        has_voted,
    }))
}

/// Cast the authenticated voter's ballot.
///
/// The whole ballot is inserted in one transaction, so a voter's answers are
/// recorded all-or-nothing. The unique vote index turns any concurrent
/// double-cast into a duplicate key error, which is reported as a benign
/// "already voted" rather than a failure.
#[post("/public/<election_id>/cast", data = "<request>", format = "json")]
pub(crate) async fn cast_vote(
    token: AuthToken<Voter>,
    election_id: Id,
    request: Json<CastRequest>,
    client: &rocket::State<Client>,
    elections: Coll<Election>,
    questions: Coll<Question>,
    options: Coll<QuestionOption>,
    voters: Coll<Voter>,
    votes: Coll<Vote>,
    new_votes: Coll<NewVote>,
) -> Result<Json<CastReceipt>> {
    let election = visible_election(election_id, &elections).await?;
    if election.state() == ElectionState::Closed {
        return Err(Error::Forbidden(format!(
            "Election {election_id} has ended"
        )));
    }
    let voter = voter_for_election(election_id, &token, &voters).await?;

    let selections = request.into_inner().selections;
    if selections.is_empty() {
        return Err(Error::BadRequest(
            "A ballot must answer at least one question".to_string(),
        ));
    }

    // Validate the selections against the actual ballot structure.
    let question_ids: HashSet<Id> = questions
        .find(doc! { "election_id": election_id }, None)
        .await?
        .map_ok(|question| question.id)
        .try_collect()
        .await?;
    let option_questions: HashMap<Id, Id> = options
        .find(
            doc! { "question_id": { "$in": question_ids.iter().copied().collect::<Vec<_>>() } },
            None,
        )
        .await?
        .map_ok(|option| (option.id, option.question_id))
        .try_collect()
        .await?;

    let mut answered = HashSet::new();
    for selection in &selections {
        if !question_ids.contains(&selection.question) {
            return Err(Error::BadRequest(format!(
                "Question {} is not part of election {election_id}",
                selection.question
            )));
        }
        if !answered.insert(selection.question) {
            return Err(Error::BadRequest(format!(
                "Question {} is answered more than once",
                selection.question
            )));
        }
        if option_questions.get(&selection.option) != Some(&selection.question) {
            return Err(Error::BadRequest(format!(
                "Option {} is not an option of question {}",
                selection.option, selection.question
            )));
        }
    }

    // Cheap pre-check; the unique index below is the real guarantee.
    if have_already_voted(&votes, election_id, voter.id).await? {
        return Ok(Json(CastReceipt { already_voted: true }));
    }

    let ballot: Vec<NewVote> = selections
        .iter()
        .map(|selection| NewVote {
            election_id,
            question_id: selection.question,
            option_id: selection.option,
            voter_id: voter.id,
        })
        .collect();

    let mut session = client.start_session(None).await?;
    session.start_transaction(None).await?;
    match new_votes
        .insert_many_with_session(&ballot, None, &mut session)
        .await
    {
        Ok(_) => {
            session.commit_transaction().await?;
            info!(
                "Voter {} cast {} votes in election {election_id}",
                voter.id,
                ballot.len()
            );
            Ok(Json(CastReceipt {
                already_voted: false,
            }))
        }
        Err(err) => {
            session.abort_transaction().await?;
            if is_duplicate_key_error(&err) {
                // Lost a race against another cast of the same ballot.
                Ok(Json(CastReceipt { already_voted: true }))
            } else {
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::json,
    };

    use crate::model::{
        api::{
            ballot::Selection,
            election::{ElectionDescription, ElectionSpec, OptionSpec, QuestionSpec},
            voter::{VoterCredentials, VoterSpec},
        },
        db::Vote,
    };

    use super::super::{auth, ballot, elections};
    use super::*;

    struct TestBallot {
        election: Id,
        question: Id,
        first_option: Id,
        second_option: Id,
    }

    /// Build a one-question election with a registered voter, via the admin
    /// API.
    async fn setup_ballot(client: &Client) -> TestBallot {
        let response = client
            .post(uri!(elections::create_election))
            .header(ContentType::JSON)
            .body(json!(ElectionSpec::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let election: ElectionDescription = response.into_json().await.unwrap();
        let election: Id = election.id.into();

        let response = client
            .post(uri!(ballot::create_question(election)))
            .header(ContentType::JSON)
            .body(json!(QuestionSpec::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let question: crate::model::api::election::QuestionView =
            response.into_json().await.unwrap();
        let question: Id = question.id.into();

        let mut option_ids = Vec::new();
        for spec in [OptionSpec::example(), OptionSpec::example2()] {
            let response = client
                .post(uri!(ballot::create_option(election, question)))
                .header(ContentType::JSON)
                .body(json!(spec).to_string())
                .dispatch()
                .await;
            assert_eq!(Status::Ok, response.status());
            let option: crate::model::api::election::OptionView =
                response.into_json().await.unwrap();
            option_ids.push(option.id.into());
        }

        let response = client
            .post(uri!(ballot::create_voter(election)))
            .header(ContentType::JSON)
            .body(json!(VoterSpec::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        TestBallot {
            election,
            question,
            first_option: option_ids[0],
            second_option: option_ids[1],
        }
    }

    async fn start_election(client: &Client, election: Id) {
        let response = client
            .post(uri!(elections::start_election(election)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    /// Log in as the example voter, replacing the current session.
    async fn login_voter(client: &Client, election: Id) {
        let response = client
            .post(uri!(auth::authenticate_voter(election)))
            .header(ContentType::JSON)
            .body(json!(VoterCredentials::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    async fn cast(client: &Client, election: Id, selections: Vec<Selection>) -> CastReceipt {
        let response = client
            .post(uri!(cast_vote(election)))
            .header(ContentType::JSON)
            .body(json!(CastRequest { selections }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        response.into_json().await.unwrap()
    }

    #[backend_test(admin)]
    async fn full_voting_scenario(client: Client, votes: Coll<Vote>) {
        let ballot = setup_ballot(&client).await;

        // Nobody can see a draft election.
        let response = client
            .get(uri!(ballot_landing(ballot.election)))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());

        start_election(&client, ballot.election).await;

        let response = client
            .get(uri!(ballot_landing(ballot.election)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let view: BallotView = response.into_json().await.unwrap();
        assert_eq!(1, view.questions.len());
        assert_eq!(2, view.questions[0].options.len());

        login_voter(&client, ballot.election).await;

        let response = client
            .get(uri!(vote_form(ballot.election)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let form: VoterBallot = response.into_json().await.unwrap();
        assert!(!form.has_voted);

        let receipt = cast(
            &client,
            ballot.election,
            vec![Selection {
                question: ballot.question,
                option: ballot.first_option,
            }],
        )
        .await;
        assert!(!receipt.already_voted);
        assert_eq!(1, votes.count_documents(None, None).await.unwrap());

        let response = client
            .get(uri!(vote_form(ballot.election)))
            .dispatch()
            .await;
        let form: VoterBallot = response.into_json().await.unwrap();
        assert!(form.has_voted);

        // A second cast changes nothing, even for a different option.
        let receipt = cast(
            &client,
            ballot.election,
            vec![Selection {
                question: ballot.question,
                option: ballot.second_option,
            }],
        )
        .await;
        assert!(receipt.already_voted);
        assert_eq!(1, votes.count_documents(None, None).await.unwrap());
        let recorded: Vec<Vote> = votes
            .find(None, None)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ballot.first_option, recorded[0].option_id);
    }

    #[backend_test(admin)]
    async fn voter_routes_reject_admin_tokens(client: Client, votes: Coll<Vote>) {
        let ballot = setup_ballot(&client).await;
        start_election(&client, ballot.election).await;

        // Still authenticated as the admin, not as a voter.
        let response = client
            .get(uri!(vote_form(ballot.election)))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());

        let response = client
            .post(uri!(cast_vote(ballot.election)))
            .header(ContentType::JSON)
            .body(
                json!(CastRequest {
                    selections: vec![Selection {
                        question: ballot.question,
                        option: ballot.first_option,
                    }],
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
        assert_eq!(0, votes.count_documents(None, None).await.unwrap());
    }

    #[backend_test(admin)]
    async fn cast_validates_selections(client: Client, votes: Coll<Vote>) {
        let ballot = setup_ballot(&client).await;
        start_election(&client, ballot.election).await;
        login_voter(&client, ballot.election).await;

        // Empty ballot.
        let response = client
            .post(uri!(cast_vote(ballot.election)))
            .header(ContentType::JSON)
            .body(json!(CastRequest { selections: vec![] }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        // Unknown question.
        let response = client
            .post(uri!(cast_vote(ballot.election)))
            .header(ContentType::JSON)
            .body(
                json!(CastRequest {
                    selections: vec![Selection {
                        question: Id::new(),
                        option: ballot.first_option,
                    }],
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        // Option that does not belong to the question.
        let response = client
            .post(uri!(cast_vote(ballot.election)))
            .header(ContentType::JSON)
            .body(
                json!(CastRequest {
                    selections: vec![Selection {
                        question: ballot.question,
                        option: Id::new(),
                    }],
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        // The same question answered twice.
        let response = client
            .post(uri!(cast_vote(ballot.election)))
            .header(ContentType::JSON)
            .body(
                json!(CastRequest {
                    selections: vec![
                        Selection {
                            question: ballot.question,
                            option: ballot.first_option,
                        },
                        Selection {
                            question: ballot.question,
                            option: ballot.second_option,
                        },
                    ],
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        // Nothing got recorded by any of those.
        assert_eq!(0, votes.count_documents(None, None).await.unwrap());
    }

    #[backend_test(admin)]
    async fn cast_outside_open_state_rejected(client: Client) {
        let ballot = setup_ballot(&client).await;
        start_election(&client, ballot.election).await;
        login_voter(&client, ballot.election).await;

        // Close the election behind the voter's back.
        let response = client
            .post(uri!(auth::authenticate_admin))
            .header(ContentType::JSON)
            .body(
                json!(crate::model::api::admin::AdminCredentials::example()).to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let response = client
            .post(uri!(elections::end_election(ballot.election)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        login_voter(&client, ballot.election).await;
        let response = client
            .post(uri!(cast_vote(ballot.election)))
            .header(ContentType::JSON)
            .body(
                json!(CastRequest {
                    selections: vec![Selection {
                        question: ballot.question,
                        option: ballot.first_option,
                    }],
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(admin)]
    async fn concurrent_double_cast_is_benign(
        client: Client,
        voters: Coll<Voter>,
        new_votes: Coll<NewVote>,
        votes: Coll<Vote>,
    ) {
        let ballot = setup_ballot(&client).await;
        start_election(&client, ballot.election).await;
        login_voter(&client, ballot.election).await;

        // Simulate a cast that lands between the pre-check and the insert by
        // inserting the conflicting vote directly.
        let voter = voters.find_one(None, None).await.unwrap().unwrap();
        new_votes
            .insert_one(
                NewVote {
                    election_id: ballot.election,
                    question_id: ballot.question,
                    option_id: ballot.second_option,
                    voter_id: voter.id,
                },
                None,
            )
            .await
            .unwrap();

        let receipt = cast(
            &client,
            ballot.election,
            vec![Selection {
                question: ballot.question,
                option: ballot.first_option,
            }],
        )
        .await;
        assert!(receipt.already_voted);
        assert_eq!(1, votes.count_documents(None, None).await.unwrap());
    }

    #[backend_test(admin)]
    async fn voters_scoped_to_their_election(client: Client) {
        let ballot = setup_ballot(&client).await;
        start_election(&client, ballot.election).await;

        // A second, unrelated election.
        let response = client
            .post(uri!(elections::create_election))
            .header(ContentType::JSON)
            .body(json!({ "name": "Another Election" }).to_string())
            .dispatch()
            .await;
        let other: ElectionDescription = response.into_json().await.unwrap();
        let other: Id = other.id.into();
        let response = client
            .post(uri!(elections::start_election(other)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        login_voter(&client, ballot.election).await;
        let response = client.get(uri!(vote_form(other))).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());
        let response = client
            .post(uri!(cast_vote(other)))
            .header(ContentType::JSON)
            .body(
                json!(CastRequest {
                    selections: vec![Selection {
                        question: ballot.question,
                        option: ballot.first_option,
                    }],
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }
}
