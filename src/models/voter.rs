use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::vote::Vote;

/// A person entitled to vote in exactly one election
/// Maps to `eligible_voters`; `votes` is loaded alongside the voter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibleVoter {
    pub voter_id: i64,
    pub election_id: i64,
    pub name: String,
    /// Named attributes (matriculation number, department, ...) used by access rules
    pub discriminators: HashMap<String, String>,
    pub votes: Vec<Vote>,
}

/// New EligibleVoter for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEligibleVoter {
    pub election_id: i64,
    pub name: String,
    pub discriminators: HashMap<String, String>,
}

impl EligibleVoter {
    pub fn discriminator(&self, name: &str) -> Option<&str> {
        self.discriminators.get(name).map(String::as_str)
    }

    /// Whether the voter holds a queued or committed vote for the voting
    pub fn has_vote_for(&self, voting_id: i64) -> bool {
        self.votes.iter().any(|vote| vote.voting_id == voting_id)
    }

    pub fn queued_votes_at(&self, ballot_box_id: i64) -> impl Iterator<Item = &Vote> {
        self.votes
            .iter()
            .filter(move |vote| vote.is_queued() && vote.ballot_box_id == ballot_box_id)
    }

    /// Whether the voter has queued votes at a ballot box other than the given one
    pub fn is_queued_elsewhere(&self, ballot_box_id: i64) -> bool {
        self.votes
            .iter()
            .any(|vote| vote.is_queued() && vote.ballot_box_id != ballot_box_id)
    }

    /// Case-insensitive check of the first `count` letters of the voter's name
    pub fn verify_letters(&self, letters: &str, count: usize) -> bool {
        let expected: Vec<char> = self
            .name
            .chars()
            .filter(|c| c.is_alphabetic())
            .take(count)
            .flat_map(char::to_lowercase)
            .collect();
        let supplied: Vec<char> = letters.chars().flat_map(char::to_lowercase).collect();

        !expected.is_empty() && expected == supplied
    }
}
