use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Election owning ballot boxes, votings and eligible voters
/// Maps to `elections` joined with `election_periods`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Election {
    pub election_id: i64,
    pub name: String,
    pub short_name: String,
    pub periods: Vec<ElectionPeriod>,
}

/// Time window during which voting is permitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionPeriod {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// New Election for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewElection {
    pub name: String,
    pub short_name: String,
    pub periods: Vec<ElectionPeriod>,
}

impl ElectionPeriod {
    pub fn new(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Self {
        Self { starts_at, ends_at }
    }

    /// Periods are half-open: the end instant is already outside the window.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.starts_at <= instant && instant < self.ends_at
    }
}

impl Election {
    /// An election is open if `now` falls within at least one of its periods
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.periods.iter().any(|period| period.contains(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn election_with(periods: Vec<ElectionPeriod>) -> Election {
        Election {
            election_id: 1,
            name: "Student Parliament".to_string(),
            short_name: "SP".to_string(),
            periods,
        }
    }

    #[test]
    fn test_open_inside_any_period() {
        let now = Utc::now();
        let election = election_with(vec![
            ElectionPeriod::new(now - Duration::days(2), now - Duration::days(1)),
            ElectionPeriod::new(now - Duration::hours(1), now + Duration::hours(1)),
        ]);

        assert!(election.is_open(now));
        assert!(!election.is_open(now + Duration::hours(2)));
    }

    #[test]
    fn test_closed_without_periods() {
        assert!(!election_with(vec![]).is_open(Utc::now()));
    }

    #[test]
    fn test_period_end_is_exclusive() {
        let now = Utc::now();
        let period = ElectionPeriod::new(now - Duration::hours(1), now);
        assert!(!period.contains(now));
        assert!(period.contains(now - Duration::minutes(1)));
    }
}
