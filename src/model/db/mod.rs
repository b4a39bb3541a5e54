//! DB-compatible (e.g. de/serialisable) types.
//!
//! Each entity is split into a `*Core` (the document body, which is also what
//! gets inserted for new records) and a full record carrying the database
//! `_id`.

mod admin;
pub use admin::{Admin, AdminCore, NewAdmin};

mod election;
pub use election::{Election, ElectionCore, ElectionState, NewElection};

mod question;
pub use question::{NewQuestion, Question, QuestionCore};

mod option;
pub use option::{NewQuestionOption, OptionCore, QuestionOption};

mod voter;
pub use voter::{NewVoter, Voter, VoterCore};

mod vote;
pub use vote::{have_already_voted, NewVote, Vote, VoteCore};
