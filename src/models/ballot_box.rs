use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a physical ballot box as driven by the election administration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BallotBoxState {
    /// Registered but not yet handed out to a polling station
    #[default]
    Created,
    /// Handed out; the only state in which votes may be cast
    Emitted,
    /// Returned after the election period
    Returned,
}

impl BallotBoxState {
    pub fn accepts_votes(&self) -> bool {
        matches!(self, Self::Emitted)
    }
}

impl fmt::Display for BallotBoxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Emitted => write!(f, "emitted"),
            Self::Returned => write!(f, "returned"),
        }
    }
}

impl std::str::FromStr for BallotBoxState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "emitted" => Ok(Self::Emitted),
            "returned" => Ok(Self::Returned),
            _ => Err(format!("Invalid ballot box state: {s}")),
        }
    }
}

/// A remote terminal through which one polling location enters votes
/// Maps to `ballot_boxes`; vote counters are derived from `votes` on load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallotBox {
    pub ballot_box_id: i64,
    pub election_id: i64,
    /// Stable external key, used by the authorized-connection mapping
    pub identifier: String,
    pub name: String,
    pub ssh_public_key: Option<String>,
    pub state: BallotBoxState,
    pub queued_votes: i64,
    pub committed_votes: i64,
}

/// New BallotBox for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBallotBox {
    pub election_id: i64,
    pub identifier: String,
    pub name: String,
    pub ssh_public_key: Option<String>,
    pub state: BallotBoxState,
}

impl BallotBox {
    pub fn queued_votes_count(&self) -> i64 {
        self.queued_votes
    }

    pub fn committed_votes_count(&self) -> i64 {
        self.committed_votes
    }

    pub fn total_votes_count(&self) -> i64 {
        self.queued_votes + self.committed_votes
    }

    pub(crate) fn record_queued(&mut self, count: usize) {
        self.queued_votes += count as i64;
    }

    pub(crate) fn record_committed(&mut self, count: usize) {
        let count = count as i64;
        self.queued_votes = (self.queued_votes - count).max(0);
        self.committed_votes += count;
    }

    pub(crate) fn record_cancelled(&mut self, count: usize) {
        self.queued_votes = (self.queued_votes - count as i64).max(0);
    }
}
