pub mod admin;
pub mod auth;
pub mod ballot;
pub mod election;
pub mod id;
pub mod voter;
