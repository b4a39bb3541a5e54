use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::db::NewAdmin;

/// Minimum accepted password length for admins and voters.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Credentials for logging in as an existing admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminCredentials {
    pub email: String,
    pub password: String,
}

/// Data for creating a brand new admin account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSignup {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl AdminSignup {
    /// Check the signup data is well-formed, returning a human-readable
    /// reason if it isn't.
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Name must not be empty".to_string());
        }
        if !well_formed_email(&self.email) {
            return Err(format!("'{}' is not a valid email address", self.email));
        }
        if self.password.len() < MIN_PASSWORD_LENGTH {
            return Err(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            ));
        }
        Ok(())
    }
}

impl TryFrom<AdminSignup> for NewAdmin {
    type Error = String;

    fn try_from(signup: AdminSignup) -> Result<Self, Self::Error> {
        signup.validate()?;
        Ok(NewAdmin {
            name: signup.name,
            email: signup.email,
            password_hash: hash_password(&signup.password),
        })
    }
}

/// Hash a password with argon2 and a fresh random salt.
pub(crate) fn hash_password(password: &str) -> String {
    let salt = rand::thread_rng().gen::<[u8; 16]>();
    // The default config cannot fail on non-empty salt.
    argon2::hash_encoded(password.as_bytes(), &salt, &argon2::Config::default())
        .expect("Failed to hash password")
}

/// Rough sanity check rather than full RFC 5322 validation: exactly one '@'
/// with a dotted domain after it.
fn well_formed_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}
