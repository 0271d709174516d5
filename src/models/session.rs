use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session status definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Initial state when the session is created
    #[default]
    Running,
    /// Session finished or was preempted
    Ended,
}

impl SessionStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "ended" => Ok(Self::Ended),
            _ => Err(format!("Invalid session status: {s}")),
        }
    }
}

/// Discriminant selecting the concrete session variant of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// A remote-shell session owned by one OS process
    #[default]
    Interactive,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interactive => write!(f, "interactive"),
        }
    }
}

impl std::str::FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interactive" => Ok(Self::Interactive),
            _ => Err(format!("Invalid session kind: {s}")),
        }
    }
}

/// Persisted session of one ballot box
/// Maps to `sessions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: i64,
    pub ballot_box_id: i64,
    pub kind: SessionKind,
    pub status: SessionStatus,
    /// Owning process, set for interactive sessions
    pub pid: Option<i32>,
    pub date_started: DateTime<Utc>,
    pub date_ended: Option<DateTime<Utc>>,
}

/// New SessionRecord for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub ballot_box_id: i64,
    pub kind: SessionKind,
    pub pid: Option<i32>,
    pub date_started: DateTime<Utc>,
}

impl SessionRecord {
    /// Move to `ended`; a no-op on records that already ended
    pub fn mark_ended(&mut self, at: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = SessionStatus::Ended;
        self.date_ended = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_mark_ended_keeps_first_end_date() {
        let started = Utc::now();
        let mut record = SessionRecord {
            session_id: 1,
            ballot_box_id: 1,
            kind: SessionKind::Interactive,
            status: SessionStatus::Running,
            pid: Some(4242),
            date_started: started,
            date_ended: None,
        };

        let first = started + Duration::seconds(10);
        record.mark_ended(first);
        record.mark_ended(first + Duration::seconds(10));

        assert_eq!(record.status, SessionStatus::Ended);
        assert_eq!(record.date_ended, Some(first));
    }

    #[test]
    fn test_status_string_conversion() {
        assert_eq!(SessionStatus::Running.to_string(), "running");
        assert_eq!(
            "ended".parse::<SessionStatus>().unwrap(),
            SessionStatus::Ended
        );
        assert_eq!(
            "interactive".parse::<SessionKind>().unwrap(),
            SessionKind::Interactive
        );
    }
}
