//! Private per-process termination channel.
//!
//! A preempting process drops a [`TerminationNotice`] into the queue of the
//! process that owns the old session; that process consumes it the next time
//! it checks its session status. Delivery is at-least-once and best-effort,
//! the OS interrupt sent alongside is the backstop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

use crate::models::SessionRecord;

/// "Please stop" message addressed to the process of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminationNotice {
    pub id: Uuid,
    pub session_id: i64,
    pub ballot_box_id: i64,
    pub sent_at: DateTime<Utc>,
}

impl TerminationNotice {
    pub fn for_session(record: &SessionRecord, sent_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: record.session_id,
            ballot_box_id: record.ballot_box_id,
            sent_at,
        }
    }
}

/// Message channel keyed by process identity
pub trait SignalChannel: Send + Sync {
    fn send(&self, pid: i32, notice: &TerminationNotice) -> io::Result<()>;

    /// Consume the oldest pending notice addressed to `pid`
    fn poll(&self, pid: i32) -> io::Result<Option<TerminationNotice>>;

    /// Drop every pending notice addressed to `pid`
    fn clear(&self, pid: i32) -> io::Result<()>;
}

/// Signal channel backed by one directory per process
///
/// Notices are JSON files written to a temporary name and renamed into
/// place, so readers never observe a partial notice.
#[derive(Debug, Clone)]
pub struct FileSignalChannel {
    root: PathBuf,
}

impl FileSignalChannel {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn queue_dir(&self, pid: i32) -> PathBuf {
        self.root.join(pid.to_string())
    }

    fn pending(&self, pid: i32) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(self.queue_dir(pid)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        // File names start with the send time, so lexical order is send order
        files.sort();
        Ok(files)
    }
}

impl SignalChannel for FileSignalChannel {
    fn send(&self, pid: i32, notice: &TerminationNotice) -> io::Result<()> {
        let dir = self.queue_dir(pid);
        fs::create_dir_all(&dir)?;

        let name = format!(
            "{:020}-{}",
            notice.sent_at.timestamp_nanos_opt().unwrap_or_default(),
            notice.id
        );
        let staging = dir.join(format!(".{name}.tmp"));
        let target = dir.join(format!("{name}.json"));

        let payload = serde_json::to_vec(notice)?;
        fs::write(&staging, payload)?;
        fs::rename(&staging, &target)
    }

    fn poll(&self, pid: i32) -> io::Result<Option<TerminationNotice>> {
        for path in self.pending(pid)? {
            let payload = match fs::read(&path) {
                Ok(payload) => payload,
                // Consumed concurrently
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            }

            match serde_json::from_slice(&payload) {
                Ok(notice) => return Ok(Some(notice)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding malformed termination notice");
                }
            }
        }
        Ok(None)
    }

    fn clear(&self, pid: i32) -> io::Result<()> {
        match fs::remove_dir_all(self.queue_dir(pid)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
