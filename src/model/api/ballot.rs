use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

use super::election::BallotView;

/// A single answer within a cast ballot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub question: Id,
    pub option: Id,
}

/// A full ballot as submitted by a voter: one selection per answered question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastRequest {
    pub selections: Vec<Selection>,
}

/// The outcome of casting a ballot.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastReceipt {
    /// True if no votes were recorded because this voter had already voted.
    pub already_voted: bool,
}

/// The voter's view of an election: the ballot plus whether they have voted.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterBallot {
    #[serde(flatten)]
    pub ballot: BallotView,
    pub has_voted: bool,
}
