use mongodb::bson::doc;
use rocket::{
    http::{Cookie, CookieJar},
    serde::json::Json,
    Route, State,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    api::{
        admin::{AdminCredentials, AdminSignup},
        auth::{AuthToken, AUTH_TOKEN_COOKIE},
        voter::VoterCredentials,
    },
    db::{Admin, NewAdmin, Voter},
    mongodb::{is_duplicate_key_error, Coll, Id},
};

pub fn routes() -> Vec<Route> {
    routes![signup, authenticate_admin, authenticate_voter, logout]
}

/// Create a new admin account and log in as it.
#[post("/auth/admins", data = "<signup>", format = "json")]
pub(crate) async fn signup(
    signup: Json<AdminSignup>,
    cookies: &CookieJar<'_>,
    config: &State<Config>,
    admins: Coll<NewAdmin>,
) -> Result<()> {
    let new_admin: NewAdmin = signup
        .into_inner()
        .try_into()
        .map_err(Error::BadRequest)?;

    // The unique index makes this reliable even under concurrent signups.
    let new_id: Id = match admins.insert_one(&new_admin, None).await {
        Ok(result) => result
            .inserted_id
            .as_object_id()
            .expect("Mongo always assigns an ObjectId")
            .into(),
        Err(err) if is_duplicate_key_error(&err) => {
            return Err(Error::BadRequest(format!(
                "Email '{}' is already in use",
                new_admin.email
            )))
        }
        Err(err) => return Err(err.into()),
    };

    let admin = Admin {
        id: new_id,
        admin: new_admin,
    };
    cookies.add(AuthToken::new(&admin).into_cookie(config));
    Ok(())
}

/// Log in as an existing admin.
#[post("/auth/admin", data = "<credentials>", format = "json")]
pub(crate) async fn authenticate_admin(
    credentials: Json<AdminCredentials>,
    cookies: &CookieJar<'_>,
    config: &State<Config>,
    admins: Coll<Admin>,
) -> Result<()> {
    let admin = admins
        .find_one(doc! { "email": &credentials.email }, None)
        .await?
        .ok_or_else(|| Error::Unauthorized("Invalid Email".to_string()))?;

    if !admin.verify_password(&credentials.password) {
        return Err(Error::Unauthorized("Invalid Password".to_string()));
    }

    cookies.add(AuthToken::new(&admin).into_cookie(config));
    Ok(())
}

/// Log in as a voter of the given election.
#[post(
    "/auth/elections/<election_id>/voter",
    data = "<credentials>",
    format = "json"
)]
pub(crate) async fn authenticate_voter(
    election_id: Id,
    credentials: Json<VoterCredentials>,
    cookies: &CookieJar<'_>,
    config: &State<Config>,
    voters: Coll<Voter>,
) -> Result<()> {
    // Voter IDs are only unique within an election, so the lookup is scoped.
    let voter = voters
        .find_one(
            doc! {
                "election_id": election_id,
                "voter_id": &credentials.voter_id,
            },
            None,
        )
        .await?
        .ok_or_else(|| Error::Unauthorized("Invalid Voter Id".to_string()))?;

    if !voter.verify_password(&credentials.password) {
        return Err(Error::Unauthorized("Invalid Password".to_string()));
    }

    cookies.add(AuthToken::new(&voter).into_cookie(config));
    Ok(())
}

/// Log out of whatever session is active.
#[delete("/auth")]
pub(crate) fn logout(cookies: &CookieJar<'_>) {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::json,
    };

    use crate::model::{
        api::voter::VoterSpec,
        db::{NewElection, NewVoter},
    };

    use super::*;

    #[backend_test]
    async fn signup_and_login(client: Client, admins: Coll<Admin>) {
        let response = client
            .post(uri!(signup))
            .header(ContentType::JSON)
            .body(json!(AdminSignup::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(response.cookies().get(AUTH_TOKEN_COOKIE).is_some());

        let inserted = admins
            .find_one(doc! { "email": &AdminSignup::example().email }, None)
            .await
            .unwrap();
        assert!(inserted.is_some());

        // Log out and back in with the same credentials.
        let response = client.delete(uri!(logout)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));

        let response = client
            .post(uri!(authenticate_admin))
            .header(ContentType::JSON)
            .body(json!(AdminCredentials::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(response.cookies().get(AUTH_TOKEN_COOKIE).is_some());
    }

    #[backend_test]
    async fn signup_validation(client: Client, admins: Coll<Admin>) {
        let mut bad_email = AdminSignup::example();
        bad_email.email = "not-an-email".to_string();
        let response = client
            .post(uri!(signup))
            .header(ContentType::JSON)
            .body(json!(bad_email).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let mut short_password = AdminSignup::example();
        short_password.password = "short".to_string();
        let response = client
            .post(uri!(signup))
            .header(ContentType::JSON)
            .body(json!(short_password).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let count = admins.count_documents(None, None).await.unwrap();
        assert_eq!(0, count);
    }

    #[backend_test]
    async fn signup_duplicate_email(client: Client, admins: Coll<Admin>) {
        let response = client
            .post(uri!(signup))
            .header(ContentType::JSON)
            .body(json!(AdminSignup::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let mut same_email = AdminSignup::example2();
        same_email.email = AdminSignup::example().email;
        let response = client
            .post(uri!(signup))
            .header(ContentType::JSON)
            .body(json!(same_email).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let count = admins.count_documents(None, None).await.unwrap();
        assert_eq!(1, count);
    }

    #[backend_test]
    async fn login_rejects_bad_credentials(client: Client, admins: Coll<NewAdmin>) {
        admins
            .insert_one(NewAdmin::example(), None)
            .await
            .unwrap();

        let mut wrong_email = AdminCredentials::example();
        wrong_email.email = "nobody@example.com".to_string();
        let response = client
            .post(uri!(authenticate_admin))
            .header(ContentType::JSON)
            .body(json!(wrong_email).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());

        let mut wrong_password = AdminCredentials::example();
        wrong_password.password = "definitely not it".to_string();
        let response = client
            .post(uri!(authenticate_admin))
            .header(ContentType::JSON)
            .body(json!(wrong_password).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());

        let response = client
            .post(uri!(authenticate_admin))
            .header(ContentType::JSON)
            .body(json!(AdminCredentials::empty()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test]
    async fn voter_login_scoped_to_election(
        client: Client,
        elections: Coll<NewElection>,
        voters: Coll<NewVoter>,
    ) {
        let first = elections
            .insert_one(NewElection::new("First".to_string(), Id::new()), None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap();
        let second = elections
            .insert_one(NewElection::new("Second".to_string(), Id::new()), None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap();

        let voter = VoterSpec::example().into_voter(first.into()).unwrap();
        voters.insert_one(voter, None).await.unwrap();

        // Correct election.
        let response = client
            .post(uri!(authenticate_voter(Id::from(first))))
            .header(ContentType::JSON)
            .body(json!(VoterCredentials::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(response.cookies().get(AUTH_TOKEN_COOKIE).is_some());

        // Same credentials against a different election.
        let response = client
            .post(uri!(authenticate_voter(Id::from(second))))
            .header(ContentType::JSON)
            .body(json!(VoterCredentials::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
    }
}
