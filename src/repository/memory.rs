//! In-process backend.
//!
//! All tables sit behind a single `parking_lot` lock, so each trait method is
//! atomic with respect to every other one. Ballot box vote counters and voter
//! vote collections are derived from the vote table on every read, matching
//! what the PostgreSQL backend computes with joins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{
    BallotBoxRepository, ElectionRepository, RepositoryError, RepositoryResult,
    SessionRepository, VoteRepository, VoterRepository, VotingRepository,
};
use crate::models::{
    BallotBox, BallotBoxState, Election, EligibleVoter, NewBallotBox, NewElection,
    NewEligibleVoter, NewSession, NewVoting, SessionRecord, SessionStatus, Vote, VoteState,
    Voting, VotingGroup,
};

#[derive(Debug, Default)]
struct Tables {
    last_id: i64,
    elections: BTreeMap<i64, Election>,
    ballot_boxes: BTreeMap<i64, BallotBox>,
    voters: BTreeMap<i64, EligibleVoter>,
    voting_groups: BTreeMap<i64, VotingGroup>,
    votings: BTreeMap<i64, Voting>,
    votes: BTreeMap<i64, Vote>,
    sessions: BTreeMap<i64, SessionRecord>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn hydrate_ballot_box(&self, ballot_box: &BallotBox) -> BallotBox {
        let mut hydrated = ballot_box.clone();
        let votes = self
            .votes
            .values()
            .filter(|vote| vote.ballot_box_id == ballot_box.ballot_box_id);
        let (mut queued, mut committed) = (0, 0);
        for vote in votes {
            match vote.state {
                VoteState::Queued => queued += 1,
                VoteState::Committed => committed += 1,
            }
        }
        hydrated.queued_votes = queued;
        hydrated.committed_votes = committed;
        hydrated
    }

    fn hydrate_voter(&self, voter: &EligibleVoter) -> EligibleVoter {
        let mut hydrated = voter.clone();
        hydrated.votes = self
            .votes
            .values()
            .filter(|vote| vote.voter_id == voter.voter_id)
            .cloned()
            .collect();
        hydrated
    }

    fn has_vote(&self, voter_id: i64, voting_id: i64) -> bool {
        self.votes
            .values()
            .any(|vote| vote.voter_id == voter_id && vote.voting_id == voting_id)
    }
}

/// Repository backend holding every table in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_election(&self, new_election: NewElection) -> Election {
        let mut tables = self.tables.write();
        let election = Election {
            election_id: tables.next_id(),
            name: new_election.name,
            short_name: new_election.short_name,
            periods: new_election.periods,
        };
        tables
            .elections
            .insert(election.election_id, election.clone());
        election
    }

    pub fn add_ballot_box(&self, new_box: NewBallotBox) -> BallotBox {
        let mut tables = self.tables.write();
        let ballot_box = BallotBox {
            ballot_box_id: tables.next_id(),
            election_id: new_box.election_id,
            identifier: new_box.identifier,
            name: new_box.name,
            ssh_public_key: new_box.ssh_public_key,
            state: new_box.state,
            queued_votes: 0,
            committed_votes: 0,
        };
        tables
            .ballot_boxes
            .insert(ballot_box.ballot_box_id, ballot_box.clone());
        ballot_box
    }

    /// Administrative emit/return of a ballot box
    pub fn set_ballot_box_state(
        &self,
        ballot_box_id: i64,
        state: BallotBoxState,
    ) -> RepositoryResult<()> {
        let mut tables = self.tables.write();
        let ballot_box = tables
            .ballot_boxes
            .get_mut(&ballot_box_id)
            .ok_or_else(|| RepositoryError::not_found("BallotBox", ballot_box_id))?;
        ballot_box.state = state;
        Ok(())
    }

    pub fn add_voter(&self, new_voter: NewEligibleVoter) -> EligibleVoter {
        let mut tables = self.tables.write();
        let voter = EligibleVoter {
            voter_id: tables.next_id(),
            election_id: new_voter.election_id,
            name: new_voter.name,
            discriminators: new_voter.discriminators,
            votes: Vec::new(),
        };
        tables.voters.insert(voter.voter_id, voter.clone());
        voter
    }

    pub fn add_voting_group(&self, election_id: i64, name: impl Into<String>) -> VotingGroup {
        let mut tables = self.tables.write();
        let group = VotingGroup {
            voting_group_id: tables.next_id(),
            election_id,
            name: name.into(),
        };
        tables
            .voting_groups
            .insert(group.voting_group_id, group.clone());
        group
    }

    pub fn add_voting(&self, new_voting: NewVoting) -> Voting {
        let mut tables = self.tables.write();
        let voting = Voting {
            voting_id: tables.next_id(),
            election_id: new_voting.election_id,
            voting_group_id: new_voting.voting_group_id,
            name: new_voting.name,
            discriminator: new_voting.discriminator,
            discrimination_mode: new_voting.discrimination_mode,
            discriminator_values: new_voting.discriminator_values,
        };
        tables.votings.insert(voting.voting_id, voting.clone());
        voting
    }

    /// Snapshot of every stored vote, in insertion order
    pub fn votes(&self) -> Vec<Vote> {
        self.tables.read().votes.values().cloned().collect()
    }

    /// Snapshot of every stored session, oldest first
    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.tables.read().sessions.values().cloned().collect()
    }
}

#[async_trait]
impl ElectionRepository for MemoryStore {
    async fn find_election(&self, election_id: i64) -> RepositoryResult<Option<Election>> {
        Ok(self.tables.read().elections.get(&election_id).cloned())
    }
}

#[async_trait]
impl BallotBoxRepository for MemoryStore {
    async fn find_ballot_box(&self, ballot_box_id: i64) -> RepositoryResult<Option<BallotBox>> {
        let tables = self.tables.read();
        Ok(tables
            .ballot_boxes
            .get(&ballot_box_id)
            .map(|ballot_box| tables.hydrate_ballot_box(ballot_box)))
    }

    async fn find_ballot_box_by_identifier(
        &self,
        identifier: &str,
    ) -> RepositoryResult<Option<BallotBox>> {
        let tables = self.tables.read();
        Ok(tables
            .ballot_boxes
            .values()
            .find(|ballot_box| ballot_box.identifier == identifier)
            .map(|ballot_box| tables.hydrate_ballot_box(ballot_box)))
    }

    async fn list_ballot_boxes(&self) -> RepositoryResult<Vec<BallotBox>> {
        let tables = self.tables.read();
        let mut boxes: Vec<BallotBox> = tables
            .ballot_boxes
            .values()
            .map(|ballot_box| tables.hydrate_ballot_box(ballot_box))
            .collect();
        boxes.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(boxes)
    }
}

#[async_trait]
impl VoterRepository for MemoryStore {
    async fn find_voter(&self, voter_id: i64) -> RepositoryResult<Option<EligibleVoter>> {
        let tables = self.tables.read();
        Ok(tables
            .voters
            .get(&voter_id)
            .map(|voter| tables.hydrate_voter(voter)))
    }

    async fn find_voter_by_discriminator(
        &self,
        election_id: i64,
        name: &str,
        value: &str,
    ) -> RepositoryResult<Option<EligibleVoter>> {
        let tables = self.tables.read();
        Ok(tables
            .voters
            .values()
            .find(|voter| voter.election_id == election_id && voter.discriminator(name) == Some(value))
            .map(|voter| tables.hydrate_voter(voter)))
    }
}

#[async_trait]
impl VotingRepository for MemoryStore {
    async fn find_voting(&self, voting_id: i64) -> RepositoryResult<Option<Voting>> {
        Ok(self.tables.read().votings.get(&voting_id).cloned())
    }

    async fn list_votings(&self, election_id: i64) -> RepositoryResult<Vec<Voting>> {
        Ok(self
            .tables
            .read()
            .votings
            .values()
            .filter(|voting| voting.election_id == election_id)
            .cloned()
            .collect())
    }

    async fn list_voting_groups(&self, election_id: i64) -> RepositoryResult<Vec<VotingGroup>> {
        Ok(self
            .tables
            .read()
            .voting_groups
            .values()
            .filter(|group| group.election_id == election_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl VoteRepository for MemoryStore {
    async fn find_vote(&self, voter_id: i64, voting_id: i64) -> RepositoryResult<Option<Vote>> {
        Ok(self
            .tables
            .read()
            .votes
            .values()
            .find(|vote| vote.voter_id == voter_id && vote.voting_id == voting_id)
            .cloned())
    }

    async fn insert_queued_votes(
        &self,
        ballot_box_id: i64,
        voter_id: i64,
        voting_ids: &[i64],
        created_at: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Vote>> {
        let mut tables = self.tables.write();

        // Validate the whole batch before touching the table
        for (index, &voting_id) in voting_ids.iter().enumerate() {
            if tables.has_vote(voter_id, voting_id) || voting_ids[..index].contains(&voting_id) {
                return Err(RepositoryError::DuplicateVote {
                    voter_id,
                    voting_id,
                });
            }
        }

        let mut inserted = Vec::with_capacity(voting_ids.len());
        for &voting_id in voting_ids {
            let vote = Vote {
                vote_id: tables.next_id(),
                voter_id,
                voting_id,
                ballot_box_id,
                state: VoteState::Queued,
                created_at,
                committed_at: None,
            };
            tables.votes.insert(vote.vote_id, vote.clone());
            inserted.push(vote);
        }
        Ok(inserted)
    }

    async fn commit_queued_votes(
        &self,
        ballot_box_id: i64,
        voter_id: i64,
        committed_at: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Vote>> {
        let mut tables = self.tables.write();
        let mut committed = Vec::new();
        for vote in tables.votes.values_mut() {
            if vote.ballot_box_id == ballot_box_id && vote.voter_id == voter_id && vote.is_queued()
            {
                vote.state = VoteState::Committed;
                vote.committed_at = Some(committed_at);
                committed.push(vote.clone());
            }
        }
        Ok(committed)
    }

    async fn delete_queued_votes(
        &self,
        ballot_box_id: i64,
        voter_id: i64,
    ) -> RepositoryResult<Vec<Vote>> {
        let mut tables = self.tables.write();
        let doomed: Vec<i64> = tables
            .votes
            .values()
            .filter(|vote| {
                vote.ballot_box_id == ballot_box_id && vote.voter_id == voter_id && vote.is_queued()
            })
            .map(|vote| vote.vote_id)
            .collect();

        Ok(doomed
            .into_iter()
            .filter_map(|vote_id| tables.votes.remove(&vote_id))
            .collect())
    }

    async fn count_votes(&self, ballot_box_id: i64, state: VoteState) -> RepositoryResult<i64> {
        Ok(self
            .tables
            .read()
            .votes
            .values()
            .filter(|vote| vote.ballot_box_id == ballot_box_id && vote.state == state)
            .count() as i64)
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn find_sessions_by_ballot_box(
        &self,
        ballot_box_id: i64,
    ) -> RepositoryResult<Vec<SessionRecord>> {
        Ok(self
            .tables
            .read()
            .sessions
            .values()
            .filter(|session| session.ballot_box_id == ballot_box_id)
            .cloned()
            .collect())
    }

    async fn find_session(&self, session_id: i64) -> RepositoryResult<Option<SessionRecord>> {
        Ok(self.tables.read().sessions.get(&session_id).cloned())
    }

    async fn add_session(&self, new_session: NewSession) -> RepositoryResult<SessionRecord> {
        let mut tables = self.tables.write();
        let record = SessionRecord {
            session_id: tables.next_id(),
            ballot_box_id: new_session.ballot_box_id,
            kind: new_session.kind,
            status: SessionStatus::Running,
            pid: new_session.pid,
            date_started: new_session.date_started,
            date_ended: None,
        };
        tables.sessions.insert(record.session_id, record.clone());
        Ok(record)
    }

    async fn update_session(&self, session: &SessionRecord) -> RepositoryResult<SessionRecord> {
        let mut tables = self.tables.write();
        let stored = tables
            .sessions
            .get_mut(&session.session_id)
            .ok_or_else(|| RepositoryError::not_found("Session", session.session_id))?;

        if !stored.status.is_terminal() {
            stored.status = session.status;
        }
        if stored.date_ended.is_none() {
            stored.date_ended = session.date_ended;
        }
        Ok(stored.clone())
    }
}
