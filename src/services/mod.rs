//! Domain services operating on the repository layer.

pub mod vote_service;

pub use vote_service::{VoteError, VoteService};
