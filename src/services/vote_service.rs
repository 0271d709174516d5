use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::models::{BallotBox, EligibleVoter, Vote, VoteState, Voting};
use crate::repository::{BallotStore, RepositoryError};

/// Error types for vote lifecycle operations
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("Voter {voter_id} already voted in voting {voting_id}")]
    AlreadyVoted { voter_id: i64, voting_id: i64 },

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for VoteError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::DuplicateVote {
                voter_id,
                voting_id,
            } => Self::AlreadyVoted {
                voter_id,
                voting_id,
            },
            other => Self::Repository(other),
        }
    }
}

pub type VoteResult<T> = Result<T, VoteError>;

/// Vote lifecycle: queue, commit and cancel votes
///
/// Enforces one non-cancelled vote per (voter, voting). The store is the
/// authority; the voter's `votes` collection and the ballot box counters are
/// kept in step only after the store accepted a change.
#[derive(Clone)]
pub struct VoteService {
    store: Arc<dyn BallotStore>,
    clock: Arc<dyn Clock>,
}

impl VoteService {
    pub fn new(store: Arc<dyn BallotStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Queue a vote for a single voting
    pub async fn create_vote(
        &self,
        ballot_box: &mut BallotBox,
        voter: &mut EligibleVoter,
        voting: &Voting,
    ) -> VoteResult<Vote> {
        let mut votes = self
            .create_votes(ballot_box, voter, std::slice::from_ref(voting))
            .await?;
        votes
            .pop()
            .ok_or_else(|| VoteError::Repository(RepositoryError::not_found("Vote", voting.voting_id)))
    }

    /// Queue votes for several votings, all or nothing
    ///
    /// The store inserts the whole batch inside one transaction; if any voting
    /// already has a vote of this voter nothing is persisted and the first
    /// conflict is reported.
    pub async fn create_votes(
        &self,
        ballot_box: &mut BallotBox,
        voter: &mut EligibleVoter,
        votings: &[Voting],
    ) -> VoteResult<Vec<Vote>> {
        for voting in votings {
            self.ensure_not_voted(voter, voting).await?;
        }

        let voting_ids: Vec<i64> = votings.iter().map(|voting| voting.voting_id).collect();
        let votes = self
            .store
            .insert_queued_votes(
                ballot_box.ballot_box_id,
                voter.voter_id,
                &voting_ids,
                self.clock.now(),
            )
            .await
            .inspect_err(|error| {
                warn!(
                    voter_id = voter.voter_id,
                    ballot_box = %ballot_box.identifier,
                    error = %error,
                    "Queuing votes rolled back"
                );
            })?;

        voter.votes.extend(votes.iter().cloned());
        ballot_box.record_queued(votes.len());

        info!(
            voter_id = voter.voter_id,
            ballot_box = %ballot_box.identifier,
            count = votes.len(),
            "Votes queued"
        );
        Ok(votes)
    }

    /// Remove every queued vote of the voter at this ballot box
    ///
    /// Committed votes are untouched. Returns the number of cancelled votes.
    pub async fn cancel_pending_votes_for_voter(
        &self,
        ballot_box: &mut BallotBox,
        voter: &mut EligibleVoter,
    ) -> VoteResult<usize> {
        let removed = self
            .store
            .delete_queued_votes(ballot_box.ballot_box_id, voter.voter_id)
            .await?;

        voter
            .votes
            .retain(|vote| !removed.iter().any(|gone| gone.vote_id == vote.vote_id));
        ballot_box.record_cancelled(removed.len());

        info!(
            voter_id = voter.voter_id,
            ballot_box = %ballot_box.identifier,
            count = removed.len(),
            "Queued votes cancelled"
        );
        Ok(removed.len())
    }

    /// Commit every queued vote of the voter at this ballot box
    ///
    /// Committing is permanent. Returns the number of newly committed votes,
    /// so a repeated call returns zero.
    pub async fn commit_pending_votes_for_voter(
        &self,
        ballot_box: &mut BallotBox,
        voter: &mut EligibleVoter,
    ) -> VoteResult<usize> {
        let committed = self
            .store
            .commit_queued_votes(ballot_box.ballot_box_id, voter.voter_id, self.clock.now())
            .await?;

        for stored in &committed {
            match voter
                .votes
                .iter_mut()
                .find(|vote| vote.vote_id == stored.vote_id)
            {
                Some(vote) => *vote = stored.clone(),
                None => voter.votes.push(stored.clone()),
            }
        }
        ballot_box.record_committed(committed.len());

        info!(
            voter_id = voter.voter_id,
            ballot_box = %ballot_box.identifier,
            count = committed.len(),
            "Queued votes committed"
        );
        Ok(committed.len())
    }

    pub async fn queued_votes_count(&self, ballot_box: &BallotBox) -> VoteResult<i64> {
        Ok(self
            .store
            .count_votes(ballot_box.ballot_box_id, VoteState::Queued)
            .await?)
    }

    pub async fn committed_votes_count(&self, ballot_box: &BallotBox) -> VoteResult<i64> {
        Ok(self
            .store
            .count_votes(ballot_box.ballot_box_id, VoteState::Committed)
            .await?)
    }

    async fn ensure_not_voted(&self, voter: &EligibleVoter, voting: &Voting) -> VoteResult<()> {
        let already = voter.has_vote_for(voting.voting_id)
            || self
                .store
                .find_vote(voter.voter_id, voting.voting_id)
                .await?
                .is_some();

        if already {
            debug!(
                voter_id = voter.voter_id,
                voting_id = voting.voting_id,
                "Voter already voted"
            );
            return Err(VoteError::AlreadyVoted {
                voter_id: voter.voter_id,
                voting_id: voting.voting_id,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for VoteService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoteService").finish_non_exhaustive()
    }
}
