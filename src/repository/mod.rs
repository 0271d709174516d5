//! # Repository Layer
//!
//! Async persistence traits consumed by the session registry, the vote
//! lifecycle service and the protocol engine. Two backends implement every
//! trait: [`MemoryStore`] for tests and single-process deployments, and
//! [`PgStore`] for PostgreSQL.
//!
//! The traits are deliberately narrow. Operations that must be atomic across
//! several rows (queuing the votes of a multi-voting ballot, committing or
//! cancelling a voter's queued votes, updating a session's status) are single
//! trait methods so each backend can give them a transaction boundary.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    BallotBox, Election, EligibleVoter, NewSession, SessionRecord, Vote, VoteState, Voting,
    VotingGroup,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Error types for repository operations
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Voter {voter_id} already has a vote for voting {voting_id}")]
    DuplicateVote { voter_id: i64, voting_id: i64 },

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait ElectionRepository: Send + Sync {
    /// Find an election together with its periods
    async fn find_election(&self, election_id: i64) -> RepositoryResult<Option<Election>>;
}

#[async_trait]
pub trait BallotBoxRepository: Send + Sync {
    async fn find_ballot_box(&self, ballot_box_id: i64) -> RepositoryResult<Option<BallotBox>>;

    /// Find a ballot box by its external identifier
    async fn find_ballot_box_by_identifier(
        &self,
        identifier: &str,
    ) -> RepositoryResult<Option<BallotBox>>;

    /// List all ballot boxes ordered by identifier
    async fn list_ballot_boxes(&self) -> RepositoryResult<Vec<BallotBox>>;
}

#[async_trait]
pub trait VoterRepository: Send + Sync {
    /// Find a voter with their votes loaded
    async fn find_voter(&self, voter_id: i64) -> RepositoryResult<Option<EligibleVoter>>;

    /// Find the voter of an election whose discriminator `name` equals `value`
    async fn find_voter_by_discriminator(
        &self,
        election_id: i64,
        name: &str,
        value: &str,
    ) -> RepositoryResult<Option<EligibleVoter>>;
}

#[async_trait]
pub trait VotingRepository: Send + Sync {
    async fn find_voting(&self, voting_id: i64) -> RepositoryResult<Option<Voting>>;

    /// List the votings of an election ordered by id
    async fn list_votings(&self, election_id: i64) -> RepositoryResult<Vec<Voting>>;

    async fn list_voting_groups(&self, election_id: i64) -> RepositoryResult<Vec<VotingGroup>>;
}

#[async_trait]
pub trait VoteRepository: Send + Sync {
    /// Find the (queued or committed) vote of a voter for a voting
    async fn find_vote(&self, voter_id: i64, voting_id: i64) -> RepositoryResult<Option<Vote>>;

    /// Insert one queued vote per voting, all or nothing
    ///
    /// Fails with [`RepositoryError::DuplicateVote`] and persists nothing if the
    /// voter already holds a vote for any of the votings.
    async fn insert_queued_votes(
        &self,
        ballot_box_id: i64,
        voter_id: i64,
        voting_ids: &[i64],
        created_at: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Vote>>;

    /// Commit every queued vote of the voter at the ballot box, returning them
    async fn commit_queued_votes(
        &self,
        ballot_box_id: i64,
        voter_id: i64,
        committed_at: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Vote>>;

    /// Delete every queued vote of the voter at the ballot box, returning them
    async fn delete_queued_votes(
        &self,
        ballot_box_id: i64,
        voter_id: i64,
    ) -> RepositoryResult<Vec<Vote>>;

    async fn count_votes(&self, ballot_box_id: i64, state: VoteState) -> RepositoryResult<i64>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// All sessions of a ballot box, oldest first
    async fn find_sessions_by_ballot_box(
        &self,
        ballot_box_id: i64,
    ) -> RepositoryResult<Vec<SessionRecord>>;

    async fn find_session(&self, session_id: i64) -> RepositoryResult<Option<SessionRecord>>;

    async fn add_session(&self, new_session: NewSession) -> RepositoryResult<SessionRecord>;

    /// Persist the status of a session and return the stored record
    ///
    /// Updates are serialised per row and `ended` is sticky: a concurrent writer
    /// can never move an ended session back to `running`.
    async fn update_session(&self, session: &SessionRecord) -> RepositoryResult<SessionRecord>;
}

/// Every repository the core needs, as one object-safe bundle
pub trait BallotStore:
    ElectionRepository
    + BallotBoxRepository
    + VoterRepository
    + VotingRepository
    + VoteRepository
    + SessionRepository
{
}

impl<T> BallotStore for T where
    T: ElectionRepository
        + BallotBoxRepository
        + VoterRepository
        + VotingRepository
        + VoteRepository
        + SessionRepository
{
}
