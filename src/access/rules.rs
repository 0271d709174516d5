use super::VotingAccessRule;
use crate::models::{EligibleVoter, Voting};

/// Voter and voting must belong to the same election; always has an opinion
#[derive(Debug, Clone, Copy, Default)]
pub struct ElectionMembershipRule;

impl VotingAccessRule for ElectionMembershipRule {
    fn can_vote(&self, _voter: &EligibleVoter, _voting: &Voting) -> bool {
        true
    }

    fn may_participate(&self, voter: &EligibleVoter, voting: &Voting) -> bool {
        voter.election_id == voting.election_id
    }

    fn description(&self) -> &'static str {
        "Voter and voting must belong to the same election"
    }
}

/// Allow/deny list over one voter discriminator
///
/// Only has an opinion on votings that declare a discriminator. A voter
/// without a value for that discriminator is denied in both modes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscriminatorRule;

impl VotingAccessRule for DiscriminatorRule {
    fn can_vote(&self, _voter: &EligibleVoter, voting: &Voting) -> bool {
        voting.discriminator.is_some()
    }

    fn may_participate(&self, voter: &EligibleVoter, voting: &Voting) -> bool {
        let Some(name) = voting.discriminator.as_deref() else {
            return true;
        };
        voter
            .discriminator(name)
            .is_some_and(|value| voting.admits_value(value))
    }

    fn description(&self) -> &'static str {
        "Voter discriminator must pass the voting's allow/deny list"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiscriminationMode;
    use std::collections::HashMap;

    fn voter(election_id: i64, department: Option<&str>) -> EligibleVoter {
        let mut discriminators = HashMap::new();
        if let Some(department) = department {
            discriminators.insert("department".to_string(), department.to_string());
        }
        EligibleVoter {
            voter_id: 1,
            election_id,
            name: "Alice".to_string(),
            discriminators,
            votes: vec![],
        }
    }

    fn voting(discriminator: Option<&str>, mode: DiscriminationMode, values: &[&str]) -> Voting {
        Voting {
            voting_id: 1,
            election_id: 1,
            voting_group_id: None,
            name: "V".to_string(),
            discriminator: discriminator.map(str::to_string),
            discrimination_mode: mode,
            discriminator_values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn test_membership_rule() {
        let voting = voting(None, DiscriminationMode::Allow, &[]);
        assert!(ElectionMembershipRule.can_vote(&voter(2, None), &voting));
        assert!(ElectionMembershipRule.may_participate(&voter(1, None), &voting));
        assert!(!ElectionMembershipRule.may_participate(&voter(2, None), &voting));
    }

    #[test]
    fn test_discriminator_rule_only_opines_on_scoped_votings() {
        let open = voting(None, DiscriminationMode::Allow, &[]);
        let scoped = voting(Some("department"), DiscriminationMode::Allow, &["A"]);

        assert!(!DiscriminatorRule.can_vote(&voter(1, Some("A")), &open));
        assert!(DiscriminatorRule.can_vote(&voter(1, Some("A")), &scoped));
    }

    #[test]
    fn test_missing_discriminator_is_denied_in_both_modes() {
        let allow = voting(Some("department"), DiscriminationMode::Allow, &["A"]);
        let deny = voting(Some("department"), DiscriminationMode::Deny, &["A"]);

        assert!(!DiscriminatorRule.may_participate(&voter(1, None), &allow));
        assert!(!DiscriminatorRule.may_participate(&voter(1, None), &deny));
    }
}
