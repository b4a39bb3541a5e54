use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core option data: one possible answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionCore {
    /// The question this option belongs to.
    pub question_id: Id,
    /// Option title.
    pub title: String,
}

/// An option without an ID.
pub type NewQuestionOption = OptionCore;

/// An option from the database, with its unique ID.
/// Named `QuestionOption` to stay clear of `std::option::Option`.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub option: OptionCore,
}

impl Deref for QuestionOption {
    type Target = OptionCore;

    fn deref(&self) -> &Self::Target {
        &self.option
    }
}

impl DerefMut for QuestionOption {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.option
    }
}
