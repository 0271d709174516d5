use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Vote state definitions
///
/// Cancelling a queued vote deletes it, so there is no cancelled state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VoteState {
    /// Cast at a ballot box but not yet committed
    #[default]
    Queued,
    /// Permanently counted
    Committed,
}

impl VoteState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed)
    }
}

impl fmt::Display for VoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Committed => write!(f, "committed"),
        }
    }
}

impl std::str::FromStr for VoteState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "committed" => Ok(Self::Committed),
            _ => Err(format!("Invalid vote state: {s}")),
        }
    }
}

/// Links a voter, a voting and the ballot box the vote was cast at
/// Maps to `votes`; at most one row exists per (voter, voting)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub vote_id: i64,
    pub voter_id: i64,
    pub voting_id: i64,
    pub ballot_box_id: i64,
    pub state: VoteState,
    pub created_at: DateTime<Utc>,
    pub committed_at: Option<DateTime<Utc>>,
}

impl Vote {
    pub fn is_queued(&self) -> bool {
        self.state == VoteState::Queued
    }

    pub fn is_committed(&self) -> bool {
        self.state == VoteState::Committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_state_serde() {
        let json = serde_json::to_string(&VoteState::Committed).unwrap();
        assert_eq!(json, "\"committed\"");

        let parsed: VoteState = serde_json::from_str("\"queued\"").unwrap();
        assert_eq!(parsed, VoteState::Queued);
    }

    #[test]
    fn test_only_committed_is_terminal() {
        assert!(VoteState::Committed.is_terminal());
        assert!(!VoteState::Queued.is_terminal());
        assert_eq!(VoteState::default(), VoteState::Queued);
    }
}
