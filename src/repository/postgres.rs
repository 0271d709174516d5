//! PostgreSQL backend.
//!
//! Queries are built at runtime with `sqlx::query_as` against the schema in
//! `migrations/`. Enum columns are stored as text and parsed on the way out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::{
    BallotBoxRepository, ElectionRepository, RepositoryError, RepositoryResult,
    SessionRepository, VoteRepository, VoterRepository, VotingRepository,
};
use crate::config::DatabaseConfig;
use crate::models::{
    BallotBox, Election, ElectionPeriod, EligibleVoter, NewSession, SessionRecord, Vote,
    VoteState, Voting, VotingGroup,
};

const BALLOT_BOX_SELECT: &str = r#"
    SELECT b.ballot_box_id, b.election_id, b.identifier, b.name, b.ssh_public_key, b.state,
           COUNT(v.vote_id) FILTER (WHERE v.state = 'queued') AS queued_votes,
           COUNT(v.vote_id) FILTER (WHERE v.state = 'committed') AS committed_votes
    FROM ballot_boxes b
    LEFT JOIN votes v ON v.ballot_box_id = b.ballot_box_id
"#;

const VOTE_COLUMNS: &str =
    "vote_id, voter_id, voting_id, ballot_box_id, state, created_at, committed_at";

const SESSION_COLUMNS: &str =
    "session_id, ballot_box_id, kind, status, pid, date_started, date_ended";

const VOTING_COLUMNS: &str = "voting_id, election_id, voting_group_id, name, discriminator, \
                              discrimination_mode, discriminator_values";

fn parse_column<T>(value: &str, column: &str) -> RepositoryResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e: String| RepositoryError::InvalidData(format!("{column}: {e}")))
}

#[derive(Debug, FromRow)]
struct ElectionRow {
    election_id: i64,
    name: String,
    short_name: String,
}

#[derive(Debug, FromRow)]
struct ElectionPeriodRow {
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct BallotBoxRow {
    ballot_box_id: i64,
    election_id: i64,
    identifier: String,
    name: String,
    ssh_public_key: Option<String>,
    state: String,
    queued_votes: i64,
    committed_votes: i64,
}

impl TryFrom<BallotBoxRow> for BallotBox {
    type Error = RepositoryError;

    fn try_from(row: BallotBoxRow) -> RepositoryResult<Self> {
        Ok(BallotBox {
            ballot_box_id: row.ballot_box_id,
            election_id: row.election_id,
            identifier: row.identifier,
            name: row.name,
            ssh_public_key: row.ssh_public_key,
            state: parse_column(&row.state, "ballot_boxes.state")?,
            queued_votes: row.queued_votes,
            committed_votes: row.committed_votes,
        })
    }
}

#[derive(Debug, FromRow)]
struct VoterRow {
    voter_id: i64,
    election_id: i64,
    name: String,
    discriminators: Json<HashMap<String, String>>,
}

#[derive(Debug, FromRow)]
struct VotingRow {
    voting_id: i64,
    election_id: i64,
    voting_group_id: Option<i64>,
    name: String,
    discriminator: Option<String>,
    discrimination_mode: String,
    discriminator_values: Vec<String>,
}

impl TryFrom<VotingRow> for Voting {
    type Error = RepositoryError;

    fn try_from(row: VotingRow) -> RepositoryResult<Self> {
        Ok(Voting {
            voting_id: row.voting_id,
            election_id: row.election_id,
            voting_group_id: row.voting_group_id,
            name: row.name,
            discriminator: row.discriminator,
            discrimination_mode: parse_column(
                &row.discrimination_mode,
                "votings.discrimination_mode",
            )?,
            discriminator_values: row.discriminator_values.into_iter().collect(),
        })
    }
}

#[derive(Debug, FromRow)]
struct VotingGroupRow {
    voting_group_id: i64,
    election_id: i64,
    name: String,
}

#[derive(Debug, FromRow)]
struct VoteRow {
    vote_id: i64,
    voter_id: i64,
    voting_id: i64,
    ballot_box_id: i64,
    state: String,
    created_at: DateTime<Utc>,
    committed_at: Option<DateTime<Utc>>,
}

impl TryFrom<VoteRow> for Vote {
    type Error = RepositoryError;

    fn try_from(row: VoteRow) -> RepositoryResult<Self> {
        Ok(Vote {
            vote_id: row.vote_id,
            voter_id: row.voter_id,
            voting_id: row.voting_id,
            ballot_box_id: row.ballot_box_id,
            state: parse_column(&row.state, "votes.state")?,
            created_at: row.created_at,
            committed_at: row.committed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    session_id: i64,
    ballot_box_id: i64,
    kind: String,
    status: String,
    pid: Option<i32>,
    date_started: DateTime<Utc>,
    date_ended: Option<DateTime<Utc>>,
}

impl TryFrom<SessionRow> for SessionRecord {
    type Error = RepositoryError;

    fn try_from(row: SessionRow) -> RepositoryResult<Self> {
        Ok(SessionRecord {
            session_id: row.session_id,
            ballot_box_id: row.ballot_box_id,
            kind: parse_column(&row.kind, "sessions.kind")?,
            status: parse_column(&row.status, "sessions.status")?,
            pid: row.pid,
            date_started: row.date_started,
            date_ended: row.date_ended,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> RepositoryResult<Vec<T>>
where
    T: TryFrom<R, Error = RepositoryError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Repository backend over a PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool sized by the database configuration
    pub async fn connect(config: &DatabaseConfig) -> RepositoryResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await?;

        debug!(
            max_connections = config.max_connections,
            "Connected to PostgreSQL"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> RepositoryResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    async fn votes_of_voter(&self, voter_id: i64) -> RepositoryResult<Vec<Vote>> {
        let rows = sqlx::query_as::<_, VoteRow>(&format!(
            "SELECT {VOTE_COLUMNS} FROM votes WHERE voter_id = $1 ORDER BY vote_id"
        ))
        .bind(voter_id)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn hydrate_voter(&self, row: VoterRow) -> RepositoryResult<EligibleVoter> {
        let votes = self.votes_of_voter(row.voter_id).await?;
        Ok(EligibleVoter {
            voter_id: row.voter_id,
            election_id: row.election_id,
            name: row.name,
            discriminators: row.discriminators.0,
            votes,
        })
    }
}

#[async_trait]
impl ElectionRepository for PgStore {
    async fn find_election(&self, election_id: i64) -> RepositoryResult<Option<Election>> {
        let Some(row) = sqlx::query_as::<_, ElectionRow>(
            "SELECT election_id, name, short_name FROM elections WHERE election_id = $1",
        )
        .bind(election_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let periods = sqlx::query_as::<_, ElectionPeriodRow>(
            r#"
            SELECT starts_at, ends_at
            FROM election_periods
            WHERE election_id = $1
            ORDER BY starts_at
            "#,
        )
        .bind(election_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Election {
            election_id: row.election_id,
            name: row.name,
            short_name: row.short_name,
            periods: periods
                .into_iter()
                .map(|p| ElectionPeriod::new(p.starts_at, p.ends_at))
                .collect(),
        }))
    }
}

#[async_trait]
impl BallotBoxRepository for PgStore {
    async fn find_ballot_box(&self, ballot_box_id: i64) -> RepositoryResult<Option<BallotBox>> {
        let row = sqlx::query_as::<_, BallotBoxRow>(&format!(
            "{BALLOT_BOX_SELECT} WHERE b.ballot_box_id = $1 GROUP BY b.ballot_box_id"
        ))
        .bind(ballot_box_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(BallotBox::try_from).transpose()
    }

    async fn find_ballot_box_by_identifier(
        &self,
        identifier: &str,
    ) -> RepositoryResult<Option<BallotBox>> {
        let row = sqlx::query_as::<_, BallotBoxRow>(&format!(
            "{BALLOT_BOX_SELECT} WHERE b.identifier = $1 GROUP BY b.ballot_box_id"
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        row.map(BallotBox::try_from).transpose()
    }

    async fn list_ballot_boxes(&self) -> RepositoryResult<Vec<BallotBox>> {
        let rows = sqlx::query_as::<_, BallotBoxRow>(&format!(
            "{BALLOT_BOX_SELECT} GROUP BY b.ballot_box_id ORDER BY b.identifier"
        ))
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }
}

#[async_trait]
impl VoterRepository for PgStore {
    async fn find_voter(&self, voter_id: i64) -> RepositoryResult<Option<EligibleVoter>> {
        let row = sqlx::query_as::<_, VoterRow>(
            "SELECT voter_id, election_id, name, discriminators FROM eligible_voters WHERE voter_id = $1",
        )
        .bind(voter_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_voter(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_voter_by_discriminator(
        &self,
        election_id: i64,
        name: &str,
        value: &str,
    ) -> RepositoryResult<Option<EligibleVoter>> {
        let row = sqlx::query_as::<_, VoterRow>(
            r#"
            SELECT voter_id, election_id, name, discriminators
            FROM eligible_voters
            WHERE election_id = $1 AND discriminators ->> $2 = $3
            ORDER BY voter_id
            LIMIT 1
            "#,
        )
        .bind(election_id)
        .bind(name)
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_voter(row).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl VotingRepository for PgStore {
    async fn find_voting(&self, voting_id: i64) -> RepositoryResult<Option<Voting>> {
        let row = sqlx::query_as::<_, VotingRow>(&format!(
            "SELECT {VOTING_COLUMNS} FROM votings WHERE voting_id = $1"
        ))
        .bind(voting_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Voting::try_from).transpose()
    }

    async fn list_votings(&self, election_id: i64) -> RepositoryResult<Vec<Voting>> {
        let rows = sqlx::query_as::<_, VotingRow>(&format!(
            "SELECT {VOTING_COLUMNS} FROM votings WHERE election_id = $1 ORDER BY voting_id"
        ))
        .bind(election_id)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn list_voting_groups(&self, election_id: i64) -> RepositoryResult<Vec<VotingGroup>> {
        let rows = sqlx::query_as::<_, VotingGroupRow>(
            r#"
            SELECT voting_group_id, election_id, name
            FROM voting_groups
            WHERE election_id = $1
            ORDER BY voting_group_id
            "#,
        )
        .bind(election_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| VotingGroup {
                voting_group_id: row.voting_group_id,
                election_id: row.election_id,
                name: row.name,
            })
            .collect())
    }
}

#[async_trait]
impl VoteRepository for PgStore {
    async fn find_vote(&self, voter_id: i64, voting_id: i64) -> RepositoryResult<Option<Vote>> {
        let row = sqlx::query_as::<_, VoteRow>(&format!(
            "SELECT {VOTE_COLUMNS} FROM votes WHERE voter_id = $1 AND voting_id = $2"
        ))
        .bind(voter_id)
        .bind(voting_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Vote::try_from).transpose()
    }

    async fn insert_queued_votes(
        &self,
        ballot_box_id: i64,
        voter_id: i64,
        voting_ids: &[i64],
        created_at: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Vote>> {
        // Dropping the transaction on any early return rolls every insert back
        let mut tx = self.pool.begin().await?;
        let insert = format!(
            r#"
            INSERT INTO votes (voter_id, voting_id, ballot_box_id, state, created_at)
            VALUES ($1, $2, $3, 'queued', $4)
            ON CONFLICT (voter_id, voting_id) DO NOTHING
            RETURNING {VOTE_COLUMNS}
            "#
        );

        let mut inserted = Vec::with_capacity(voting_ids.len());
        for &voting_id in voting_ids {
            let row = sqlx::query_as::<_, VoteRow>(&insert)
                .bind(voter_id)
                .bind(voting_id)
                .bind(ballot_box_id)
                .bind(created_at)
                .fetch_optional(&mut *tx)
                .await?;

            match row {
                Some(row) => inserted.push(Vote::try_from(row)?),
                None => {
                    tx.rollback().await?;
                    return Err(RepositoryError::DuplicateVote {
                        voter_id,
                        voting_id,
                    });
                }
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn commit_queued_votes(
        &self,
        ballot_box_id: i64,
        voter_id: i64,
        committed_at: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Vote>> {
        let rows = sqlx::query_as::<_, VoteRow>(&format!(
            r#"
            UPDATE votes
            SET state = 'committed', committed_at = $3
            WHERE ballot_box_id = $1 AND voter_id = $2 AND state = 'queued'
            RETURNING {VOTE_COLUMNS}
            "#
        ))
        .bind(ballot_box_id)
        .bind(voter_id)
        .bind(committed_at)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn delete_queued_votes(
        &self,
        ballot_box_id: i64,
        voter_id: i64,
    ) -> RepositoryResult<Vec<Vote>> {
        let rows = sqlx::query_as::<_, VoteRow>(&format!(
            r#"
            DELETE FROM votes
            WHERE ballot_box_id = $1 AND voter_id = $2 AND state = 'queued'
            RETURNING {VOTE_COLUMNS}
            "#
        ))
        .bind(ballot_box_id)
        .bind(voter_id)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn count_votes(&self, ballot_box_id: i64, state: VoteState) -> RepositoryResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM votes WHERE ballot_box_id = $1 AND state = $2",
        )
        .bind(ballot_box_id)
        .bind(state.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

#[async_trait]
impl SessionRepository for PgStore {
    async fn find_sessions_by_ballot_box(
        &self,
        ballot_box_id: i64,
    ) -> RepositoryResult<Vec<SessionRecord>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE ballot_box_id = $1 ORDER BY session_id"
        ))
        .bind(ballot_box_id)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn find_session(&self, session_id: i64) -> RepositoryResult<Option<SessionRecord>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRecord::try_from).transpose()
    }

    async fn add_session(&self, new_session: NewSession) -> RepositoryResult<SessionRecord> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            INSERT INTO sessions (ballot_box_id, kind, status, pid, date_started)
            VALUES ($1, $2, 'running', $3, $4)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(new_session.ballot_box_id)
        .bind(new_session.kind.to_string())
        .bind(new_session.pid)
        .bind(new_session.date_started)
        .fetch_one(&self.pool)
        .await?;

        SessionRecord::try_from(row)
    }

    async fn update_session(&self, session: &SessionRecord) -> RepositoryResult<SessionRecord> {
        // Single statement: the row lock serialises concurrent writers and the
        // CASE keeps `ended` sticky.
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE sessions
            SET status = CASE WHEN status = 'ended' THEN status ELSE $2 END,
                date_ended = COALESCE(date_ended, $3)
            WHERE session_id = $1
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session.session_id)
        .bind(session.status.to_string())
        .bind(session.date_ended)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRecord::try_from)
            .transpose()?
            .ok_or_else(|| RepositoryError::not_found("Session", session.session_id))
    }
}
