use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core voter data: an eligible voter registered under one election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterCore {
    /// The election this voter belongs to.
    pub election_id: Id,
    /// The externally-assigned voter identifier, unique within the election.
    pub voter_id: String,
    /// Their hashed password.
    pub password_hash: String,
}

impl VoterCore {
    /// Verify the given password against the stored hash.
    pub fn verify_password(&self, password: &str) -> bool {
        argon2::verify_encoded(&self.password_hash, password.as_bytes()).unwrap_or(false)
    }
}

/// A voter without an ID.
pub type NewVoter = VoterCore;

/// A voter from the database, with their unique ID.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub voter: VoterCore,
}

impl Deref for Voter {
    type Target = VoterCore;

    fn deref(&self) -> &Self::Target {
        &self.voter
    }
}

impl DerefMut for Voter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.voter
    }
}
