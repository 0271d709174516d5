use thiserror::Error;

use crate::config::ConfigurationError;
use crate::protocol::EngineError;
use crate::repository::RepositoryError;
use crate::services::VoteError;
use crate::session::SessionError;

/// Crate-wide error returned by the top-level entry points
#[derive(Debug, Error)]
pub enum BallotError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Vote error: {0}")]
    Vote(#[from] VoteError),

    #[error("Protocol engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Unknown ballot box: {0}")]
    UnknownBallotBox(String),
}

pub type Result<T> = std::result::Result<T, BallotError>;
