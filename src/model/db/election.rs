use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// States in the election lifecycle, derived from the started/ended flag
/// pair. Transitions are one-directional: Draft -> Open -> Closed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionState {
    /// Under construction, only visible to its owner. The ballot may be
    /// freely edited.
    Draft,
    /// Voting in progress. The ballot structure is frozen.
    Open,
    /// Voting over. No reopening.
    Closed,
}

/// Core election data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionCore {
    /// Election name.
    pub name: String,
    /// Has voting opened?
    pub started: bool,
    /// Has voting closed? Only ever set on a started election.
    pub ended: bool,
    /// The administrator who owns this election.
    pub admin_id: Id,
}

impl ElectionCore {
    /// Create a new draft election.
    pub fn new(name: String, admin_id: Id) -> Self {
        Self {
            name,
            started: false,
            ended: false,
            admin_id,
        }
    }

    /// The lifecycle state encoded by the flag pair.
    pub fn state(&self) -> ElectionState {
        match (self.started, self.ended) {
            // `ended` without `started` cannot be produced by any transition.
            (false, _) => ElectionState::Draft,
            (true, false) => ElectionState::Open,
            (true, true) => ElectionState::Closed,
        }
    }
}

/// An election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}
