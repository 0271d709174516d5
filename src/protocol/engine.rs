use std::collections::HashMap;
use std::io;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::command::Command;
use super::response::{ProtocolError, ProtocolErrorCode, Response};
use super::stream::StreamHandler;
use crate::access::VotingAccessManager;
use crate::clock::Clock;
use crate::config::ProtocolConfig;
use crate::logging::log_protocol_exchange;
use crate::models::{BallotBox, EligibleVoter, Voting};
use crate::repository::{BallotStore, RepositoryError};
use crate::services::{VoteError, VoteService};
use crate::session::{Session, SessionError, SessionRegistry};

pub const GREETING: &str = "ballot box session ready";

/// Errors leaving a command handler
///
/// [`EngineError::Protocol`] is answered and the loop continues; every other
/// variant ends the command loop.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Session {session_id} was preempted by a newer session")]
    SessionTerminated { session_id: i64 },

    #[error("Stream error: {0}")]
    Stream(#[from] io::Error),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Vote error: {0}")]
    Vote(VoteError),

    #[error("Session error: {0}")]
    Session(SessionError),
}

impl From<ProtocolErrorCode> for EngineError {
    fn from(code: ProtocolErrorCode) -> Self {
        Self::Protocol(ProtocolError::new(code))
    }
}

impl From<VoteError> for EngineError {
    fn from(error: VoteError) -> Self {
        match error {
            VoteError::AlreadyVoted { voting_id, .. } => Self::Protocol(ProtocolError::with_message(
                ProtocolErrorCode::AlreadyVoted,
                format!("vote already cast in voting {voting_id}"),
            )),
            other => Self::Vote(other),
        }
    }
}

impl From<SessionError> for EngineError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::Terminated { session_id } => Self::SessionTerminated { session_id },
            other => Self::Session(other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// How a command loop ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOutcome {
    /// The terminal closed its input
    EndOfInput,
    /// The terminal sent `quit`
    Quit,
    /// The hosting process was asked to shut down
    Interrupted,
    /// A newer session took over the ballot box
    Preempted,
}

/// Services an engine borrows for the lifetime of one session
#[derive(Clone, Copy)]
pub struct EngineContext<'a> {
    pub store: &'a dyn BallotStore,
    pub registry: &'a SessionRegistry,
    pub votes: &'a VoteService,
    pub access: &'a VotingAccessManager,
    pub protocol: &'a ProtocolConfig,
    pub clock: &'a dyn Clock,
}

impl EngineContext<'_> {
    /// Votings of the voter's election the voter may still vote in
    ///
    /// Ordered by voting group name, ungrouped votings first, then by name.
    async fn open_votings(&self, voter: &EligibleVoter) -> EngineResult<Vec<Voting>> {
        let groups: HashMap<i64, String> = self
            .store
            .list_voting_groups(voter.election_id)
            .await?
            .into_iter()
            .map(|group| (group.voting_group_id, group.name))
            .collect();

        let mut votings: Vec<Voting> = self
            .store
            .list_votings(voter.election_id)
            .await?
            .into_iter()
            .filter(|voting| !voter.has_vote_for(voting.voting_id))
            .filter(|voting| self.access.may_participate(voter, voting))
            .collect();

        votings.sort_by(|a, b| {
            let group_a = a.voting_group_id.and_then(|id| groups.get(&id));
            let group_b = b.voting_group_id.and_then(|id| groups.get(&id));
            group_a
                .cmp(&group_b)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.voting_id.cmp(&b.voting_id))
        });
        Ok(votings)
    }
}

impl std::fmt::Debug for EngineContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("protocol", self.protocol)
            .finish_non_exhaustive()
    }
}

/// Per-session protocol state
#[derive(Debug, Default)]
struct EngineState {
    logged_in: bool,
    voter: Option<EligibleVoter>,
    /// Votings the selected voter has queued votes for at this box
    queued: Vec<i64>,
}

impl EngineState {
    fn deselect(&mut self) {
        self.voter = None;
        self.queued.clear();
    }
}

/// Line protocol state machine for one ballot box session
pub struct ProtocolEngine<'a, S> {
    ctx: EngineContext<'a>,
    ballot_box: BallotBox,
    session: &'a mut Session,
    stream: S,
    state: EngineState,
}

impl<'a, S: StreamHandler> ProtocolEngine<'a, S> {
    pub fn new(
        ctx: EngineContext<'a>,
        ballot_box: BallotBox,
        session: &'a mut Session,
        stream: S,
    ) -> Self {
        Self {
            ctx,
            ballot_box,
            session,
            stream,
            state: EngineState::default(),
        }
    }

    pub fn ballot_box(&self) -> &BallotBox {
        &self.ballot_box
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.logged_in
    }

    pub fn into_stream(self) -> S {
        self.stream
    }

    /// Serve commands until end of input, `quit` or preemption
    ///
    /// Preemption is answered with `ERR 10` and then reported as
    /// [`EngineError::SessionTerminated`].
    pub async fn run(&mut self) -> EngineResult<EngineOutcome> {
        self.respond(&Response::ok(GREETING)).await?;

        loop {
            let line = match self.stream.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!(ballot_box = %self.ballot_box.identifier, "End of input");
                    return Ok(EngineOutcome::EndOfInput);
                }
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    let error = ProtocolError::with_message(
                        ProtocolErrorCode::InvalidCommand,
                        "line is not valid UTF-8",
                    );
                    self.respond(&Response::from(error)).await?;
                    continue;
                }
                Err(e) => return Err(EngineError::Stream(e)),
            };

            let command = match Command::parse(&line) {
                Ok(command) => command,
                Err(error) => {
                    debug!(line = %line, "Rejecting malformed command");
                    self.respond(&Response::from(error)).await?;
                    continue;
                }
            };

            if command == Command::Quit {
                self.respond(&Response::ok("bye")).await?;
                log_protocol_exchange(&self.ballot_box.identifier, command.name(), 0);
                return Ok(EngineOutcome::Quit);
            }

            let response = match self.dispatch(&command).await {
                Ok(response) => response,
                Err(EngineError::Protocol(error)) => Response::Error(error),
                Err(EngineError::SessionTerminated { session_id }) => {
                    warn!(
                        ballot_box = %self.ballot_box.identifier,
                        session_id,
                        "Session preempted, stopping command loop"
                    );
                    let response =
                        Response::from(ProtocolError::new(ProtocolErrorCode::SessionTerminated));
                    if let Err(e) = self.respond(&response).await {
                        debug!(error = %e, "Could not report preemption to the terminal");
                    }
                    return Err(EngineError::SessionTerminated { session_id });
                }
                Err(other) => return Err(other),
            };

            log_protocol_exchange(&self.ballot_box.identifier, command.name(), response.code());
            self.respond(&response).await?;
        }
    }

    /// Handle one command, leaving protocol errors to the caller
    pub async fn dispatch(&mut self, command: &Command) -> EngineResult<Response> {
        if command.requires_login() && !self.state.logged_in {
            return Err(ProtocolErrorCode::NotLoggedIn.into());
        }
        if command.touches_votes() {
            self.ctx.registry.ensure_current(self.session).await?;
        }

        match command {
            Command::Login { identifier } => self.login(identifier).await,
            Command::Lookup { key } => self.lookup(key).await,
            Command::Check { voting_id } => self.check(*voting_id).await,
            Command::Queue {
                letters,
                voting_ids,
            } => self.queue(letters, voting_ids).await,
            Command::Commit => self.commit().await,
            Command::Cancel => self.cancel().await,
            Command::Status => self.status().await,
            Command::Quit => Ok(Response::ok("bye")),
        }
    }

    async fn login(&mut self, identifier: &str) -> EngineResult<Response> {
        if identifier != self.ballot_box.identifier {
            return Err(ProtocolError::with_message(
                ProtocolErrorCode::UnknownBallotBox,
                format!("unknown ballot box {identifier}"),
            )
            .into());
        }

        if let Some(current) = self
            .ctx
            .store
            .find_ballot_box(self.ballot_box.ballot_box_id)
            .await?
        {
            self.ballot_box = current;
        }
        self.ensure_permitted().await?;

        self.state.logged_in = true;
        info!(ballot_box = %self.ballot_box.identifier, "Ballot box logged in");
        Ok(Response::ok(format!("logged in as {}", self.ballot_box.name)))
    }

    async fn lookup(&mut self, key: &str) -> EngineResult<Response> {
        if let Some(current) = &self.state.voter {
            if !self.state.queued.is_empty() {
                return Err(ProtocolError::with_message(
                    ProtocolErrorCode::VoterAlreadyQueued,
                    format!("{} has queued votes, commit or cancel first", current.name),
                )
                .into());
            }
        }

        let voter = self
            .ctx
            .store
            .find_voter_by_discriminator(
                self.ballot_box.election_id,
                &self.ctx.protocol.voter_key_discriminator,
                key,
            )
            .await?
            .ok_or(ProtocolErrorCode::VoterNotFound)?;

        if voter.is_queued_elsewhere(self.ballot_box.ballot_box_id) {
            return Err(ProtocolError::with_message(
                ProtocolErrorCode::VoterAlreadyQueued,
                "voter already queued at another ballot box",
            )
            .into());
        }

        let restored: Vec<i64> = voter
            .queued_votes_at(self.ballot_box.ballot_box_id)
            .map(|vote| vote.voting_id)
            .collect();

        let response = if restored.is_empty() {
            let open = self.ctx.open_votings(&voter).await?;
            let listing = if open.is_empty() {
                "none".to_string()
            } else {
                open.iter()
                    .map(|voting| format!("{}={}", voting.voting_id, voting.name))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            format!("{} may vote in: {listing}", voter.name)
        } else {
            info!(
                voter_id = voter.voter_id,
                count = restored.len(),
                "Restored queued votes from an earlier session"
            );
            format!("{} has {} queued votes", voter.name, restored.len())
        };

        debug!(voter_id = voter.voter_id, "Voter selected");
        self.state.voter = Some(voter);
        self.state.queued = restored;
        Ok(Response::Ok(response))
    }

    async fn check(&mut self, voting_id: i64) -> EngineResult<Response> {
        let voter = self
            .state
            .voter
            .as_ref()
            .ok_or(ProtocolErrorCode::NoVoterSelected)?;
        let voting = self.find_voting(voting_id).await?;

        if !self.ctx.access.may_participate(voter, &voting) {
            return Err(ProtocolErrorCode::NotEligible.into());
        }
        let voted = voter.has_vote_for(voting_id)
            || self
                .ctx
                .store
                .find_vote(voter.voter_id, voting_id)
                .await?
                .is_some();
        if voted {
            return Err(ProtocolErrorCode::AlreadyVoted.into());
        }

        Ok(Response::ok(format!("{} may vote in {}", voter.name, voting.name)))
    }

    async fn queue(&mut self, letters: &str, voting_ids: &[i64]) -> EngineResult<Response> {
        let voter = self
            .state
            .voter
            .as_ref()
            .ok_or(ProtocolErrorCode::NoVoterSelected)?;
        if !self.state.queued.is_empty() {
            return Err(ProtocolErrorCode::VoterAlreadyQueued.into());
        }
        if !voter.verify_letters(letters, self.ctx.protocol.verification_letters) {
            return Err(ProtocolErrorCode::VerificationMismatch.into());
        }
        self.ensure_permitted().await?;

        let votings = if voting_ids.is_empty() {
            let open = self.ctx.open_votings(voter).await?;
            if open.is_empty() {
                return Err(ProtocolErrorCode::AlreadyVoted.into());
            }
            open
        } else {
            let mut requested = voting_ids.to_vec();
            requested.sort_unstable();
            requested.dedup();

            let mut votings = Vec::with_capacity(requested.len());
            for voting_id in requested {
                let voting = self.find_voting(voting_id).await?;
                if !self.ctx.access.may_participate(voter, &voting) {
                    return Err(ProtocolError::with_message(
                        ProtocolErrorCode::NotEligible,
                        format!("voter may not participate in voting {voting_id}"),
                    )
                    .into());
                }
                votings.push(voting);
            }
            votings
        };

        let Some(voter) = self.state.voter.as_mut() else {
            return Err(ProtocolErrorCode::NoVoterSelected.into());
        };
        let votes = self
            .ctx
            .votes
            .create_votes(&mut self.ballot_box, voter, &votings)
            .await?;

        self.state.queued = votes.iter().map(|vote| vote.voting_id).collect();
        Ok(Response::ok(format!("queued {} votes", votes.len())))
    }

    async fn commit(&mut self) -> EngineResult<Response> {
        let Some(voter) = self.state.voter.as_mut() else {
            return Err(ProtocolErrorCode::NoVoterSelected.into());
        };
        if self.state.queued.is_empty() {
            return Err(ProtocolErrorCode::VoterNotQueued.into());
        }

        let committed = self
            .ctx
            .votes
            .commit_pending_votes_for_voter(&mut self.ballot_box, voter)
            .await?;
        self.state.deselect();

        if committed == 0 {
            return Err(ProtocolErrorCode::VoterNotQueued.into());
        }
        Ok(Response::ok(format!("committed {committed} votes")))
    }

    async fn cancel(&mut self) -> EngineResult<Response> {
        let Some(voter) = self.state.voter.as_mut() else {
            return Err(ProtocolErrorCode::NoVoterSelected.into());
        };
        if self.state.queued.is_empty() {
            return Err(ProtocolErrorCode::VoterNotQueued.into());
        }

        let cancelled = self
            .ctx
            .votes
            .cancel_pending_votes_for_voter(&mut self.ballot_box, voter)
            .await?;
        self.state.deselect();

        if cancelled == 0 {
            return Err(ProtocolErrorCode::VoterNotQueued.into());
        }
        Ok(Response::ok(format!("cancelled {cancelled} votes")))
    }

    async fn status(&mut self) -> EngineResult<Response> {
        let queued = self.ctx.votes.queued_votes_count(&self.ballot_box).await?;
        let committed = self
            .ctx
            .votes
            .committed_votes_count(&self.ballot_box)
            .await?;
        Ok(Response::ok(format!(
            "{} queued {queued} committed {committed} total {}",
            self.ballot_box.identifier,
            queued + committed
        )))
    }

    /// Box is emitted and its election has an open period now
    async fn ensure_permitted(&self) -> EngineResult<()> {
        if !self.ballot_box.state.accepts_votes() {
            return Err(ProtocolErrorCode::NotPermittedNow.into());
        }
        let open = self
            .ctx
            .store
            .find_election(self.ballot_box.election_id)
            .await?
            .is_some_and(|election| election.is_open(self.ctx.clock.now()));
        if !open {
            return Err(ProtocolErrorCode::NotPermittedNow.into());
        }
        Ok(())
    }

    /// A voting of this box's election
    async fn find_voting(&self, voting_id: i64) -> EngineResult<Voting> {
        self.ctx
            .store
            .find_voting(voting_id)
            .await?
            .filter(|voting| voting.election_id == self.ballot_box.election_id)
            .ok_or_else(|| {
                ProtocolError::with_message(
                    ProtocolErrorCode::VotingNotFound,
                    format!("voting {voting_id} not found"),
                )
                .into()
            })
    }

    async fn respond(&mut self, response: &Response) -> EngineResult<()> {
        self.stream.write_line(&response.to_line()).await?;
        Ok(())
    }
}

impl<S> std::fmt::Debug for ProtocolEngine<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("ballot_box", &self.ballot_box.identifier)
            .field("session_id", &self.session.session_id())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
