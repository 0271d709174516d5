//! # Domain Models
//!
//! Plain data types for elections, ballot boxes, voters, votings, votes and
//! sessions. Persistence lives behind the traits in [`crate::repository`].

pub mod ballot_box;
pub mod election;
pub mod session;
pub mod vote;
pub mod voter;
pub mod voting;

// Re-export core models for easy access
pub use ballot_box::{BallotBox, BallotBoxState, NewBallotBox};
pub use election::{Election, ElectionPeriod, NewElection};
pub use session::{NewSession, SessionKind, SessionRecord, SessionStatus};
pub use vote::{Vote, VoteState};
pub use voter::{EligibleVoter, NewEligibleVoter};
pub use voting::{DiscriminationMode, NewVoting, Voting, VotingGroup};
