use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{Session, SessionError, SessionResult, SessionRuntime};
use crate::models::{BallotBox, NewSession, SessionKind, SessionRecord};
use crate::repository::BallotStore;

/// Keeps at most one running session per ballot box
///
/// Starting a session preempts every session of the box that still runs and
/// waits a grace period for the old processes to exit, repeating until a
/// scan finds nothing running.
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn BallotStore>,
    runtime: SessionRuntime,
    grace_period: Duration,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn BallotStore>, runtime: SessionRuntime, grace_period: Duration) -> Self {
        Self {
            store,
            runtime,
            grace_period,
        }
    }

    pub fn runtime(&self) -> &SessionRuntime {
        &self.runtime
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Preempt running sessions of the box, then create and persist a new one
    #[instrument(skip(self, ballot_box), fields(ballot_box = %ballot_box.identifier))]
    pub async fn start_session(&self, ballot_box: &BallotBox) -> SessionResult<Session> {
        loop {
            let terminated = self.end_running_sessions(ballot_box).await?;
            if terminated == 0 {
                break;
            }
            info!(
                terminated,
                grace_period_ms = self.grace_period.as_millis() as u64,
                "Waiting for preempted sessions to exit"
            );
            tokio::time::sleep(self.grace_period).await;
        }

        let pid = self.runtime.process.current_pid();
        // Notices addressed to an earlier holder of this pid must not end the new session
        if let Err(e) = self.runtime.signals.clear(pid) {
            warn!(pid, error = %e, "Clearing the signal channel failed");
        }

        let record = self
            .store
            .add_session(NewSession {
                ballot_box_id: ballot_box.ballot_box_id,
                kind: SessionKind::Interactive,
                pid: Some(pid),
                date_started: self.runtime.clock.now(),
            })
            .await?;

        info!(session_id = record.session_id, pid, "Session started");
        Session::from_record(record, self.runtime.clone())
    }

    /// Terminate every session of the box that is still running
    ///
    /// Sessions found dead are marked ended as well. Returns how many sessions
    /// had to be terminated.
    pub async fn end_running_sessions(&self, ballot_box: &BallotBox) -> SessionResult<usize> {
        let records = self
            .store
            .find_sessions_by_ballot_box(ballot_box.ballot_box_id)
            .await?;

        let mut terminated = 0;
        for record in records.into_iter().filter(|r| !r.status.is_terminal()) {
            let previous = record.status;
            match Session::from_record(record.clone(), self.runtime.clone()) {
                Ok(mut session) => {
                    if session.is_running() {
                        session.terminate();
                        terminated += 1;
                    }
                    if session.status() != previous {
                        self.store.update_session(session.record()).await?;
                    }
                }
                Err(SessionError::InvalidRecord { reason, .. }) => {
                    warn!(
                        session_id = record.session_id,
                        reason = %reason,
                        "Ending unusable session record"
                    );
                    self.persist_ended(record).await?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(terminated)
    }

    /// First session of the box that is running and whose process is alive
    ///
    /// Read-only: nothing is signalled or persisted.
    pub async fn find_active_session_for_ballot_box(
        &self,
        ballot_box: &BallotBox,
    ) -> SessionResult<Option<Session>> {
        let records = self
            .store
            .find_sessions_by_ballot_box(ballot_box.ballot_box_id)
            .await?;

        for record in records.into_iter().filter(|r| !r.status.is_terminal()) {
            match Session::from_record(record, self.runtime.clone()) {
                Ok(session) if session.is_alive() => return Ok(Some(session)),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Skipping unusable session record"),
            }
        }
        Ok(None)
    }

    /// Mark the session ended and persist it
    pub async fn end_session(&self, session: &mut Session) -> SessionResult<()> {
        session.mark_ended(self.runtime.clock.now());
        let stored = self.store.update_session(session.record()).await?;
        session.sync(&stored);
        info!(session_id = session.session_id(), "Session ended");
        Ok(())
    }

    /// Fail with [`SessionError::Terminated`] once the session was preempted
    ///
    /// Checks the local status, the signal channel and finally the stored
    /// record, which another process may have marked ended.
    pub async fn ensure_current(&self, session: &mut Session) -> SessionResult<()> {
        let session_id = session.session_id();
        if session.status().is_terminal() {
            return Err(SessionError::Terminated { session_id });
        }

        if let Err(e) = session.check_status() {
            session.mark_ended(self.runtime.clock.now());
            return Err(e);
        }

        match self.store.find_session(session_id).await? {
            Some(stored) if stored.status.is_terminal() => {
                info!(session_id, "Session was ended by another process");
                session.sync(&stored);
                Err(SessionError::Terminated { session_id })
            }
            Some(_) => Ok(()),
            None => {
                session.mark_ended(self.runtime.clock.now());
                Err(SessionError::Terminated { session_id })
            }
        }
    }

    async fn persist_ended(&self, mut record: SessionRecord) -> SessionResult<()> {
        record.mark_ended(self.runtime.clock.now());
        self.store.update_session(&record).await?;
        Ok(())
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("grace_period", &self.grace_period)
            .finish_non_exhaustive()
    }
}
