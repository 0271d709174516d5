//! Per-box status listing for the administrative `status` command.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;

use crate::models::VoteState;
use crate::repository::BallotStore;
use crate::session::{SessionRegistry, SessionResult};

/// One line of the status listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BallotBoxStatusRow {
    pub identifier: String,
    /// `running`, `ended` or `none` when the box never had a session
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub pid: Option<i32>,
    pub pending: i64,
    pub committed: i64,
    pub total: i64,
}

/// Build a status row for every ballot box
///
/// A box counts as running only while its session's process is alive; other
/// boxes report their latest session.
pub async fn status_rows(
    store: &dyn BallotStore,
    registry: &SessionRegistry,
) -> SessionResult<Vec<BallotBoxStatusRow>> {
    let mut rows = Vec::new();

    for ballot_box in store.list_ballot_boxes().await? {
        let (pending, committed) = futures::try_join!(
            store.count_votes(ballot_box.ballot_box_id, VoteState::Queued),
            store.count_votes(ballot_box.ballot_box_id, VoteState::Committed),
        )?;

        let (status, started_at, pid) =
            match registry.find_active_session_for_ballot_box(&ballot_box).await? {
                Some(session) => (
                    "running".to_string(),
                    Some(session.record().date_started),
                    session.pid(),
                ),
                None => {
                    let latest = store
                        .find_sessions_by_ballot_box(ballot_box.ballot_box_id)
                        .await?
                        .into_iter()
                        .max_by_key(|record| record.date_started);
                    match latest {
                        Some(record) => ("ended".to_string(), Some(record.date_started), record.pid),
                        None => ("none".to_string(), None, None),
                    }
                }
            };

        rows.push(BallotBoxStatusRow {
            identifier: ballot_box.identifier,
            status,
            started_at,
            pid,
            pending,
            committed,
            total: pending + committed,
        });
    }

    Ok(rows)
}

/// Render rows as an aligned text table
pub fn render_status_table(rows: &[BallotBoxStatusRow]) -> String {
    const HEADERS: [&str; 7] = ["BOX", "STATUS", "STARTED", "PID", "PENDING", "COMMITTED", "TOTAL"];

    let cells: Vec<[String; 7]> = rows
        .iter()
        .map(|row| {
            [
                row.identifier.clone(),
                row.status.clone(),
                row.started_at
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string()),
                row.pid.map_or_else(|| "-".to_string(), |pid| pid.to_string()),
                row.pending.to_string(),
                row.committed.to_string(),
                row.total.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for line in &cells {
        for (width, cell) in widths.iter_mut().zip(line) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let header = HEADERS.map(str::to_string);
    for line in std::iter::once(&header).chain(&cells) {
        let padded: Vec<String> = line
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        let _ = writeln!(out, "{}", padded.join("  ").trim_end());
    }
    out
}
