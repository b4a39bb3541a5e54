use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Validation};
use rocket::{
    http::{Cookie, SameSite, Status},
    outcome::Outcome,
    request::{self, FromRequest, Request},
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::db::{Admin, Voter};
use crate::model::mongodb::{Coll, Id};

use super::user::{Rights, User};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token representing a specific user with specific rights,
/// transported as a JWT in a private cookie.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthToken<U> {
    pub id: Id,
    #[serde(rename = "rgt")]
    rights: Rights,
    #[serde(skip)]
    phantom: PhantomData<U>,
}

impl<U: User> AuthToken<U> {
    /// Create a new token for the given user.
    pub fn new(user: &U) -> Self {
        Self {
            id: user.id(),
            rights: U::RIGHTS,
            phantom: PhantomData,
        }
    }

    /// Serialise this token into a cookie.
    pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        // Panics only on a misconfigured algorithm or unserializable claims,
        // neither of which is possible here.
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .expect("JWT encoding is infallible with HS256");

        Cookie::build(AUTH_TOKEN_COOKIE, token)
            .max_age(rocket::time::Duration::seconds(
                config.auth_ttl().num_seconds(),
            ))
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish()
    }

    /// Deserialise a token from a cookie, verifying the signature and expiry.
    pub fn from_cookie(cookie: &Cookie<'static>, config: &Config) -> Result<Self, Error> {
        let mut validation = Validation::default();
        validation.set_required_spec_claims(&["exp"]);
        let claims: Claims<U> = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &validation,
        )
        .map(|data| data.claims)?;
        Ok(claims.token)
    }

    /// Does this token grant the given rights?
    pub fn permits(&self, target: Rights) -> bool {
        self.rights == target
    }
}

/// JWT claims: the token itself plus the standard expiry timestamp.
#[derive(Serialize, Deserialize)]
struct Claims<U> {
    #[serde(flatten, bound = "")]
    token: AuthToken<U>,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r, U: User + Send> FromRequest<'r> for AuthToken<U> {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let config = req
            .guard::<&rocket::State<Config>>()
            .await
            .expect("Config should always be managed");

        let cookie = match req.cookies().get(AUTH_TOKEN_COOKIE) {
            Some(cookie) => cookie,
            None => {
                return Outcome::Failure((
                    Status::Unauthorized,
                    Error::Unauthorized("No authentication token".to_string()),
                ))
            }
        };

        let token = match Self::from_cookie(cookie, config) {
            Ok(token) => token,
            Err(err) => return Outcome::Failure((Status::Unauthorized, err)),
        };

        if !token.permits(U::RIGHTS) {
            return Outcome::Failure((
                Status::Forbidden,
                Error::Forbidden(format!("This operation requires {} rights", U::RIGHTS)),
            ));
        }

        // Reject tokens whose user has since been deleted.
        let db = req
            .guard::<&rocket::State<mongodb::Database>>()
            .await
            .expect("Database should always be managed");
        let exists = match token.rights {
            Rights::Voter => Coll::<Voter>::from_db(db)
                .find_one(token.id.as_doc(), None)
                .await
                .map(|voter| voter.is_some()),
            Rights::Admin => Coll::<Admin>::from_db(db)
                .find_one(token.id.as_doc(), None)
                .await
                .map(|admin| admin.is_some()),
        };

        match exists {
            Ok(true) => Outcome::Success(token),
            Ok(false) => Outcome::Failure((
                Status::Unauthorized,
                Error::Unauthorized("Stale authentication token".to_string()),
            )),
            Err(err) => Outcome::Failure((Status::InternalServerError, Error::Db(err))),
        }
    }
}
