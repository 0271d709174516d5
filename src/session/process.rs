//! OS process liveness and interruption.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{getpid, Pid};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessSignalError {
    #[error("Process {pid} does not exist")]
    NoSuchProcess { pid: i32 },

    #[error("Signalling process {pid} failed: {source}")]
    Failed {
        pid: i32,
        #[source]
        source: Errno,
    },
}

/// Process identity and signalling, abstracted for tests
pub trait ProcessControl: Send + Sync {
    fn current_pid(&self) -> i32;

    /// Whether a process with this pid exists
    fn is_alive(&self, pid: i32) -> bool;

    /// Send the interrupt signal that backs up a termination notice
    fn interrupt(&self, pid: i32) -> Result<(), ProcessSignalError>;
}

/// `ProcessControl` over the real OS via `kill(2)`
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcessControl;

impl ProcessControl for OsProcessControl {
    fn current_pid(&self) -> i32 {
        getpid().as_raw()
    }

    fn is_alive(&self, pid: i32) -> bool {
        // pid 0 and negative pids address process groups, never a single session
        if pid <= 0 {
            return false;
        }
        // Signal 0 only probes; EPERM means the process exists but belongs to
        // another user.
        match kill(Pid::from_raw(pid), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn interrupt(&self, pid: i32) -> Result<(), ProcessSignalError> {
        if pid <= 0 {
            return Err(ProcessSignalError::NoSuchProcess { pid });
        }
        kill(Pid::from_raw(pid), Signal::SIGINT).map_err(|errno| match errno {
            Errno::ESRCH => ProcessSignalError::NoSuchProcess { pid },
            source => ProcessSignalError::Failed { pid, source },
        })
    }
}
