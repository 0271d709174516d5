use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use super::fakes::{FakeProcessControl, MemorySignalChannel};
use crate::clock::FixedClock;
use crate::config::BallotBoxConfig;
use crate::models::{
    BallotBox, BallotBoxState, Election, ElectionPeriod, EligibleVoter, NewBallotBox,
    NewElection, NewEligibleVoter, NewVoting, Voting,
};
use crate::repository::{BallotBoxRepository, MemoryStore};
use crate::runner::BallotBoxServices;
use crate::session::{SessionRegistry, SessionRuntime};

/// Seeded election "E" open for an hour either side of now
///
/// One emitted ballot box "B1" without an SSH key, one unrestricted voting
/// "V1" and the voter "Alice Example" with matriculation number 1001.
pub struct ElectionFixture {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub process: Arc<FakeProcessControl>,
    pub signals: Arc<MemorySignalChannel>,
    pub config: BallotBoxConfig,
    pub election: Election,
    pub ballot_box: BallotBox,
    pub voting: Voting,
    pub voter: EligibleVoter,
}

impl ElectionFixture {
    /// Pid the fixture's process control reports for the calling process
    pub const PID: i32 = 1000;

    pub fn new() -> Self {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());

        let election = store.add_election(NewElection {
            name: "E".to_string(),
            short_name: "E".to_string(),
            periods: vec![ElectionPeriod::new(
                now - Duration::hours(1),
                now + Duration::hours(1),
            )],
        });
        let ballot_box = store.add_ballot_box(NewBallotBox {
            election_id: election.election_id,
            identifier: "B1".to_string(),
            name: "Main hall".to_string(),
            ssh_public_key: None,
            state: BallotBoxState::Emitted,
        });
        let voting = store.add_voting(NewVoting::unrestricted(election.election_id, "V1"));

        let config = BallotBoxConfig::default();
        let voter = seed_voter(
            &store,
            &config,
            election.election_id,
            "Alice Example",
            "1001",
            &[],
        );

        Self {
            store,
            clock: Arc::new(FixedClock::new(now)),
            process: Arc::new(FakeProcessControl::new(Self::PID)),
            signals: Arc::new(MemorySignalChannel::default()),
            config,
            election,
            ballot_box,
            voting,
            voter,
        }
    }

    /// Add a voter of the fixture election
    pub fn add_voter(
        &self,
        name: &str,
        matriculation_number: &str,
        discriminators: &[(&str, &str)],
    ) -> EligibleVoter {
        seed_voter(
            &self.store,
            &self.config,
            self.election.election_id,
            name,
            matriculation_number,
            discriminators,
        )
    }

    pub fn runtime(&self) -> SessionRuntime {
        SessionRuntime::new(
            self.process.clone(),
            self.signals.clone(),
            self.clock.clone(),
        )
    }

    pub fn registry(&self) -> SessionRegistry {
        SessionRegistry::new(
            self.store.clone(),
            self.runtime(),
            self.config.session.grace_period(),
        )
    }

    pub fn services(&self) -> BallotBoxServices {
        BallotBoxServices::new(self.store.clone(), self.runtime(), self.config.clone())
    }

    /// The ballot box as currently stored, counters included
    pub async fn reload_ballot_box(&self) -> BallotBox {
        self.store
            .find_ballot_box(self.ballot_box.ballot_box_id)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| self.ballot_box.clone())
    }
}

impl Default for ElectionFixture {
    fn default() -> Self {
        Self::new()
    }
}

fn seed_voter(
    store: &MemoryStore,
    config: &BallotBoxConfig,
    election_id: i64,
    name: &str,
    matriculation_number: &str,
    discriminators: &[(&str, &str)],
) -> EligibleVoter {
    let mut values: HashMap<String, String> = discriminators
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    values.insert(
        config.protocol.voter_key_discriminator.clone(),
        matriculation_number.to_string(),
    );

    store.add_voter(NewEligibleVoter {
        election_id,
        name: name.to_string(),
        discriminators: values,
    })
}
