//! PostgreSQL backend tests. Run with a database and `cargo test -- --ignored`.

use ballotbox_core::models::{NewSession, SessionKind, SessionStatus, VoteState};
use ballotbox_core::repository::{
    BallotBoxRepository, PgStore, RepositoryError, SessionRepository, VoteRepository,
    VoterRepository, VotingRepository,
};
use chrono::{Duration, Utc};
use sqlx::PgPool;

struct Seeded {
    ballot_box_id: i64,
    voter_id: i64,
    v1: i64,
    v2: i64,
}

async fn seed(pool: &PgPool) -> sqlx::Result<Seeded> {
    let now = Utc::now();
    let election_id: i64 = sqlx::query_scalar(
        "INSERT INTO elections (name, short_name) VALUES ('E', 'E') RETURNING election_id",
    )
    .fetch_one(pool)
    .await?;
    sqlx::query(
        "INSERT INTO election_periods (election_id, starts_at, ends_at) VALUES ($1, $2, $3)",
    )
    .bind(election_id)
    .bind(now - Duration::hours(1))
    .bind(now + Duration::hours(1))
    .execute(pool)
    .await?;

    let ballot_box_id: i64 = sqlx::query_scalar(
        "INSERT INTO ballot_boxes (election_id, identifier, name, state)
         VALUES ($1, 'B1', 'Main hall', 'emitted') RETURNING ballot_box_id",
    )
    .bind(election_id)
    .fetch_one(pool)
    .await?;

    let voter_id: i64 = sqlx::query_scalar(
        "INSERT INTO eligible_voters (election_id, name, discriminators)
         VALUES ($1, 'Alice Example', '{\"matriculation_number\": \"1001\", \"department\": \"CS\"}')
         RETURNING voter_id",
    )
    .bind(election_id)
    .fetch_one(pool)
    .await?;

    let mut votings = Vec::new();
    for name in ["V1", "V2"] {
        let voting_id: i64 = sqlx::query_scalar(
            "INSERT INTO votings (election_id, name) VALUES ($1, $2) RETURNING voting_id",
        )
        .bind(election_id)
        .bind(name)
        .fetch_one(pool)
        .await?;
        votings.push(voting_id);
    }

    Ok(Seeded {
        ballot_box_id,
        voter_id,
        v1: votings[0],
        v2: votings[1],
    })
}

#[sqlx::test(migrator = "ballotbox_core::test_helpers::MIGRATOR")]
#[ignore = "requires a PostgreSQL database"]
async fn test_queued_batch_is_all_or_nothing(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
    let seeded = seed(&pool).await?;
    let store = PgStore::new(pool);

    store
        .insert_queued_votes(seeded.ballot_box_id, seeded.voter_id, &[seeded.v2], Utc::now())
        .await?;

    let error = store
        .insert_queued_votes(
            seeded.ballot_box_id,
            seeded.voter_id,
            &[seeded.v1, seeded.v2],
            Utc::now(),
        )
        .await
        .unwrap_err();

    assert!(matches!(error, RepositoryError::DuplicateVote { voting_id, .. } if voting_id == seeded.v2));
    assert!(store.find_vote(seeded.voter_id, seeded.v1).await?.is_none());
    assert_eq!(
        store.count_votes(seeded.ballot_box_id, VoteState::Queued).await?,
        1
    );
    Ok(())
}

#[sqlx::test(migrator = "ballotbox_core::test_helpers::MIGRATOR")]
#[ignore = "requires a PostgreSQL database"]
async fn test_commit_and_cancel(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
    let seeded = seed(&pool).await?;
    let store = PgStore::new(pool);

    store
        .insert_queued_votes(seeded.ballot_box_id, seeded.voter_id, &[seeded.v1], Utc::now())
        .await?;
    let committed = store
        .commit_queued_votes(seeded.ballot_box_id, seeded.voter_id, Utc::now())
        .await?;
    let again = store
        .commit_queued_votes(seeded.ballot_box_id, seeded.voter_id, Utc::now())
        .await?;
    assert_eq!((committed.len(), again.len()), (1, 0));
    assert!(committed[0].committed_at.is_some());

    store
        .insert_queued_votes(seeded.ballot_box_id, seeded.voter_id, &[seeded.v2], Utc::now())
        .await?;
    let cancelled = store
        .delete_queued_votes(seeded.ballot_box_id, seeded.voter_id)
        .await?;
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].voting_id, seeded.v2);

    let ballot_box = store
        .find_ballot_box_by_identifier("B1")
        .await?
        .expect("ballot box");
    assert_eq!(ballot_box.committed_votes_count(), 1);
    assert_eq!(ballot_box.queued_votes_count(), 0);
    Ok(())
}

#[sqlx::test(migrator = "ballotbox_core::test_helpers::MIGRATOR")]
#[ignore = "requires a PostgreSQL database"]
async fn test_voter_lookup_by_discriminator(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
    let seeded = seed(&pool).await?;
    let store = PgStore::new(pool);
    let voting = store.find_voting(seeded.v1).await?.expect("voting");

    let voter = store
        .find_voter_by_discriminator(voting.election_id, "matriculation_number", "1001")
        .await?
        .expect("voter");
    assert_eq!(voter.voter_id, seeded.voter_id);
    assert_eq!(voter.discriminator("department"), Some("CS"));

    assert!(store
        .find_voter_by_discriminator(voting.election_id, "matriculation_number", "9999")
        .await?
        .is_none());
    assert_eq!(store.list_votings(voting.election_id).await?.len(), 2);
    Ok(())
}

#[sqlx::test(migrator = "ballotbox_core::test_helpers::MIGRATOR")]
#[ignore = "requires a PostgreSQL database"]
async fn test_ended_session_stays_ended(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
    let seeded = seed(&pool).await?;
    let store = PgStore::new(pool);

    let mut record = store
        .add_session(NewSession {
            ballot_box_id: seeded.ballot_box_id,
            kind: SessionKind::Interactive,
            pid: Some(4242),
            date_started: Utc::now(),
        })
        .await?;
    assert_eq!(record.status, SessionStatus::Running);

    record.mark_ended(Utc::now());
    let ended = store.update_session(&record).await?;

    record.status = SessionStatus::Running;
    record.date_ended = None;
    let after = store.update_session(&record).await?;

    assert_eq!(after.status, SessionStatus::Ended);
    assert_eq!(after.date_ended, ended.date_ended);
    assert_eq!(
        store.find_sessions_by_ballot_box(seeded.ballot_box_id).await?.len(),
        1
    );
    Ok(())
}
