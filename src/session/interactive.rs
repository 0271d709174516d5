use tracing::{debug, info, warn};

use super::process::ProcessSignalError;
use super::signal::TerminationNotice;
use super::{SessionError, SessionResult, SessionRuntime};
use crate::models::SessionRecord;

/// Session owned by one OS process attached to a remote terminal
///
/// The process identity addresses both the private signal channel and the
/// OS interrupt used to preempt the session.
#[derive(Clone)]
pub struct InteractiveSession {
    record: SessionRecord,
    pid: i32,
    runtime: SessionRuntime,
}

impl InteractiveSession {
    pub fn from_record(record: SessionRecord, runtime: SessionRuntime) -> SessionResult<Self> {
        let pid = record.pid.ok_or_else(|| SessionError::InvalidRecord {
            session_id: record.session_id,
            reason: "interactive session without a process id".to_string(),
        })?;
        Ok(Self {
            record,
            pid,
            runtime,
        })
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub(crate) fn record_mut(&mut self) -> &mut SessionRecord {
        &mut self.record
    }

    /// Whether this session belongs to the calling process
    pub fn is_own_process(&self) -> bool {
        self.pid == self.runtime.process.current_pid()
    }

    /// Consume pending termination notices addressed to this session
    ///
    /// Only the owning process reads its channel. Notices left over from an
    /// earlier session that ran under the same pid are discarded.
    pub fn check_status(&self) -> SessionResult<()> {
        if !self.is_own_process() {
            return Ok(());
        }

        loop {
            match self.runtime.signals.poll(self.pid) {
                Ok(Some(notice)) if notice.session_id == self.record.session_id => {
                    info!(
                        session_id = self.record.session_id,
                        pid = self.pid,
                        sent_at = %notice.sent_at,
                        "Termination notice received"
                    );
                    return Err(SessionError::Terminated {
                        session_id: self.record.session_id,
                    });
                }
                Ok(Some(stale)) => {
                    debug!(
                        session_id = self.record.session_id,
                        stale_session_id = stale.session_id,
                        "Ignoring termination notice for another session"
                    );
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    warn!(pid = self.pid, error = %e, "Polling the signal channel failed");
                    return Ok(());
                }
            }
        }
    }

    /// The owning process is this one, or still exists
    pub fn is_alive(&self) -> bool {
        self.is_own_process() || self.runtime.process.is_alive(self.pid)
    }

    /// Re-derive the status from the signal channel and process liveness
    pub fn is_running(&mut self) -> bool {
        if self.record.status.is_terminal() {
            return false;
        }

        if let Err(SessionError::Terminated { .. }) = self.check_status() {
            self.record.mark_ended(self.runtime.clock.now());
            return false;
        }

        if !self.is_alive() {
            debug!(
                session_id = self.record.session_id,
                pid = self.pid,
                "Session process is gone"
            );
            self.record.mark_ended(self.runtime.clock.now());
            return false;
        }
        true
    }

    /// Preempt the session: notice first, interrupt second, then mark ended
    ///
    /// Signalling is best-effort and repeated on every call; the status only
    /// changes the first time.
    pub fn terminate(&mut self) {
        let notice = TerminationNotice::for_session(&self.record, self.runtime.clock.now());
        if let Err(e) = self.runtime.signals.send(self.pid, &notice) {
            warn!(
                session_id = self.record.session_id,
                pid = self.pid,
                error = %e,
                "Sending termination notice failed"
            );
        }

        if !self.is_own_process() {
            match self.runtime.process.interrupt(self.pid) {
                Ok(()) => {}
                Err(ProcessSignalError::NoSuchProcess { pid }) => {
                    debug!(pid, "Session process already exited");
                }
                Err(e) => {
                    warn!(session_id = self.record.session_id, error = %e, "Interrupting session process failed");
                }
            }
        }

        self.record.mark_ended(self.runtime.clock.now());
        info!(
            session_id = self.record.session_id,
            ballot_box_id = self.record.ballot_box_id,
            pid = self.pid,
            "Session terminated"
        );
    }
}

impl std::fmt::Debug for InteractiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractiveSession")
            .field("record", &self.record)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}
