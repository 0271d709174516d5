//! # Ballot Box Sessions
//!
//! A session is the lifetime of one connection from a ballot box. At most one
//! session per box may be running; the [`SessionRegistry`] enforces this by
//! preempting older sessions before it hands out a new one.
//!
//! ## Session kinds
//!
//! [`Session`] is a closed set of variants selected by the record's
//! [`SessionKind`]. Every variant answers the same questions:
//!
//! - `check_status` - has a newer connection asked this session to stop?
//! - `is_alive` - does the owning process still exist?
//! - `is_running` - both of the above, folding the answer into the status
//! - `terminate` - preempt the session and mark it ended
//!
//! ## Signalling
//!
//! Preemption sends a [`TerminationNotice`] through a [`SignalChannel`] keyed by
//! the owning pid, immediately followed by an OS interrupt via
//! [`ProcessControl`]. Both are best-effort; the next liveness check settles
//! whether the old process actually went away.

pub mod interactive;
pub mod process;
pub mod registry;
pub mod signal;

use std::sync::Arc;
use thiserror::Error;

use crate::clock::Clock;
use crate::models::{SessionKind, SessionRecord, SessionStatus};
use crate::repository::RepositoryError;

pub use interactive::InteractiveSession;
pub use process::{OsProcessControl, ProcessControl, ProcessSignalError};
pub use registry::SessionRegistry;
pub use signal::{FileSignalChannel, SignalChannel, TerminationNotice};

/// Error types for session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session {session_id} was terminated by a newer session")]
    Terminated { session_id: i64 },

    #[error("Session {session_id} is invalid: {reason}")]
    InvalidRecord { session_id: i64, reason: String },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Process, signal and time collaborators shared by every session
#[derive(Clone)]
pub struct SessionRuntime {
    pub process: Arc<dyn ProcessControl>,
    pub signals: Arc<dyn SignalChannel>,
    pub clock: Arc<dyn Clock>,
}

impl SessionRuntime {
    pub fn new(
        process: Arc<dyn ProcessControl>,
        signals: Arc<dyn SignalChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            process,
            signals,
            clock,
        }
    }
}

impl std::fmt::Debug for SessionRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRuntime").finish_non_exhaustive()
    }
}

/// A ballot box session of any kind
#[derive(Debug, Clone)]
pub enum Session {
    Interactive(InteractiveSession),
}

impl Session {
    /// Rebuild the session variant named by a stored record
    pub fn from_record(record: SessionRecord, runtime: SessionRuntime) -> SessionResult<Self> {
        match record.kind {
            SessionKind::Interactive => Ok(Self::Interactive(InteractiveSession::from_record(
                record, runtime,
            )?)),
        }
    }

    pub fn record(&self) -> &SessionRecord {
        match self {
            Self::Interactive(session) => session.record(),
        }
    }

    fn record_mut(&mut self) -> &mut SessionRecord {
        match self {
            Self::Interactive(session) => session.record_mut(),
        }
    }

    pub fn session_id(&self) -> i64 {
        self.record().session_id
    }

    pub fn ballot_box_id(&self) -> i64 {
        self.record().ballot_box_id
    }

    pub fn status(&self) -> SessionStatus {
        self.record().status
    }

    pub fn pid(&self) -> Option<i32> {
        match self {
            Self::Interactive(session) => Some(session.pid()),
        }
    }

    pub fn check_status(&self) -> SessionResult<()> {
        match self {
            Self::Interactive(session) => session.check_status(),
        }
    }

    pub fn is_alive(&self) -> bool {
        match self {
            Self::Interactive(session) => session.is_alive(),
        }
    }

    pub fn is_running(&mut self) -> bool {
        match self {
            Self::Interactive(session) => session.is_running(),
        }
    }

    pub fn terminate(&mut self) {
        match self {
            Self::Interactive(session) => session.terminate(),
        }
    }

    /// Mark the session ended without signalling anyone
    pub(crate) fn mark_ended(&mut self, at: chrono::DateTime<chrono::Utc>) {
        self.record_mut().mark_ended(at);
    }

    /// Adopt the stored status and end date after a write or reload
    pub(crate) fn sync(&mut self, stored: &SessionRecord) {
        let record = self.record_mut();
        record.status = stored.status;
        record.date_ended = stored.date_ended;
    }
}
