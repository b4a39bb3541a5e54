use std::fmt::{Display, Formatter};

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::model::db::{Admin, Voter};
use crate::model::mongodb::Id;

/// A user who can authenticate against the API.
pub trait User {
    /// The rights this kind of user holds.
    const RIGHTS: Rights;

    /// The user's database ID.
    fn id(&self) -> Id;
}

/// The rights of a user, encoded compactly in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Rights {
    Voter = 0,
    Admin = 1,
}

impl Display for Rights {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Rights::Voter => write!(f, "voter"),
            Rights::Admin => write!(f, "admin"),
        }
    }
}

impl User for Voter {
    const RIGHTS: Rights = Rights::Voter;

    fn id(&self) -> Id {
        self.id
    }
}

impl User for Admin {
    const RIGHTS: Rights = Rights::Admin;

    fn id(&self) -> Id {
        self.id
    }
}
