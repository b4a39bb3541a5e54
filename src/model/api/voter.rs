use serde::{Deserialize, Serialize};

use crate::model::db::NewVoter;
use crate::model::mongodb::Id;

use super::admin::{hash_password, MIN_PASSWORD_LENGTH};

/// Credentials for logging in as a voter of a specific election.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoterCredentials {
    pub voter_id: String,
    pub password: String,
}

/// Data for registering a new voter under an election.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoterSpec {
    pub voter_id: String,
    pub password: String,
}

impl VoterSpec {
    /// Convert into a new voter of the given election.
    pub fn into_voter(self, election_id: Id) -> Result<NewVoter, String> {
        if self.voter_id.trim().is_empty() {
            return Err("Voter ID must not be empty".to_string());
        }
        if self.password.len() < MIN_PASSWORD_LENGTH {
            return Err(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            ));
        }
        Ok(NewVoter {
            election_id,
            voter_id: self.voter_id,
            password_hash: hash_password(&self.password),
        })
    }
}
