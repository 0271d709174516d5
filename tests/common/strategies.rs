//! Proptest strategies for voters and votings.

use ballotbox_core::models::{DiscriminationMode, EligibleVoter, Voting};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};

/// Discriminator values drawn from a small alphabet so sets overlap often
pub fn discriminator_value_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["A", "B", "C", "D", "E"]).prop_map(str::to_string)
}

pub fn discrimination_mode_strategy() -> impl Strategy<Value = DiscriminationMode> {
    prop_oneof![Just(DiscriminationMode::Allow), Just(DiscriminationMode::Deny)]
}

/// Voter of `election_id` with an optional `department` value
pub fn voter_strategy(election_id: i64) -> impl Strategy<Value = EligibleVoter> {
    proptest::option::of(discriminator_value_strategy()).prop_map(move |department| {
        let mut discriminators = HashMap::new();
        if let Some(value) = department {
            discriminators.insert("department".to_string(), value);
        }
        EligibleVoter {
            voter_id: 1,
            election_id,
            name: "Generated Voter".to_string(),
            discriminators,
            votes: Vec::new(),
        }
    })
}

/// Voting of `election_id`, optionally scoped by `department`
pub fn voting_strategy(election_id: i64) -> impl Strategy<Value = Voting> {
    (
        any::<bool>(),
        discrimination_mode_strategy(),
        prop::collection::btree_set(discriminator_value_strategy(), 0..4),
    )
        .prop_map(move |(scoped, mode, values): (bool, DiscriminationMode, BTreeSet<String>)| Voting {
            voting_id: 1,
            election_id,
            voting_group_id: None,
            name: "Generated Voting".to_string(),
            discriminator: scoped.then(|| "department".to_string()),
            discrimination_mode: mode,
            discriminator_values: values,
        })
}
