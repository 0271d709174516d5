//! # Voting Access Coordinator
//!
//! Decides whether a voter may participate in a voting by composing pluggable
//! [`VotingAccessRule`]s.
//!
//! Rules are consulted in registration order. A rule that has no opinion on a
//! (voter, voting) pair (`can_vote` is false) is skipped; the first rule that
//! has an opinion and denies wins. If no rule denies, participation is
//! allowed, including when no rule had an opinion at all. That permissive
//! default is intentional and covered by tests.

pub mod rules;

use tracing::debug;

use crate::models::{EligibleVoter, Voting};

pub use rules::{DiscriminatorRule, ElectionMembershipRule};

/// A single eligibility rule
pub trait VotingAccessRule: Send + Sync {
    /// Whether this rule has an opinion on the pair
    fn can_vote(&self, voter: &EligibleVoter, voting: &Voting) -> bool;

    /// The rule's verdict; only consulted when `can_vote` is true
    fn may_participate(&self, voter: &EligibleVoter, voting: &Voting) -> bool;

    /// Get a description of this rule for logging
    fn description(&self) -> &'static str;
}

/// Ordered composition of access rules
#[derive(Default)]
pub struct VotingAccessManager {
    rules: Vec<Box<dyn VotingAccessRule>>,
}

impl VotingAccessManager {
    /// Manager without any rule; allows everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager with the built-in election membership and discriminator rules
    pub fn with_default_rules() -> Self {
        Self::new()
            .with_rule(ElectionMembershipRule)
            .with_rule(DiscriminatorRule)
    }

    pub fn with_rule(mut self, rule: impl VotingAccessRule + 'static) -> Self {
        self.register(rule);
        self
    }

    pub fn register(&mut self, rule: impl VotingAccessRule + 'static) {
        self.rules.push(Box::new(rule));
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn may_participate(&self, voter: &EligibleVoter, voting: &Voting) -> bool {
        for rule in &self.rules {
            if !rule.can_vote(voter, voting) {
                continue;
            }
            if !rule.may_participate(voter, voting) {
                debug!(
                    voter_id = voter.voter_id,
                    voting_id = voting.voting_id,
                    rule = rule.description(),
                    "Participation denied"
                );
                return false;
            }
        }
        true
    }
}

impl std::fmt::Debug for VotingAccessManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VotingAccessManager")
            .field(
                "rules",
                &self.rules.iter().map(|r| r.description()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
