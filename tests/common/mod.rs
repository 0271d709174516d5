//! Shared setup for the integration tests.

#![allow(dead_code)]

pub mod strategies;

use ballotbox_core::models::{NewVoting, Voting};
use ballotbox_core::services::VoteService;
use ballotbox_core::test_helpers::ElectionFixture;

/// Vote service over the fixture's store and clock
pub fn vote_service(fixture: &ElectionFixture) -> VoteService {
    VoteService::new(fixture.store.clone(), fixture.clock.clone())
}

/// Add an unrestricted voting to the fixture election
pub fn add_voting(fixture: &ElectionFixture, name: &str) -> Voting {
    fixture
        .store
        .add_voting(NewVoting::unrestricted(fixture.election.election_id, name))
}
