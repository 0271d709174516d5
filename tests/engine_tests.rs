//! Protocol engine conversations against the in-memory store.

mod common;

use ballotbox_core::models::{BallotBoxState, DiscriminationMode, NewBallotBox, NewVoting};
use ballotbox_core::protocol::{
    Command, EngineError, EngineOutcome, EngineResult, ProtocolEngine, ProtocolErrorCode,
    Response, GREETING,
};
use ballotbox_core::repository::VoteRepository;
use ballotbox_core::session::{SignalChannel, TerminationNotice};
use ballotbox_core::test_helpers::{ElectionFixture, ScriptedStream, Transcript};
use chrono::Utc;
use common::{add_voting, vote_service};

async fn converse(
    fixture: &ElectionFixture,
    stream: ScriptedStream,
) -> (EngineResult<EngineOutcome>, Transcript) {
    let services = fixture.services();
    let mut session = services
        .registry
        .start_session(&fixture.ballot_box)
        .await
        .unwrap();
    let transcript = stream.transcript();
    let result = ProtocolEngine::new(
        services.context(),
        fixture.ballot_box.clone(),
        &mut session,
        stream,
    )
    .run()
    .await;
    services.registry.end_session(&mut session).await.unwrap();
    (result, transcript)
}

async fn codes_for(fixture: &ElectionFixture, lines: &[&str]) -> Vec<u8> {
    let (result, transcript) = converse(fixture, ScriptedStream::from_lines(lines)).await;
    result.unwrap();
    // Drop the greeting
    transcript.codes()[1..].to_vec()
}

#[tokio::test]
async fn test_greeting_and_login_required() {
    let fixture = ElectionFixture::new();
    let (result, transcript) =
        converse(&fixture, ScriptedStream::from_lines(&["lookup 1001", "status"])).await;

    assert_eq!(result.unwrap(), EngineOutcome::EndOfInput);
    let lines = transcript.lines();
    assert_eq!(lines[0], format!("OK {GREETING}"));
    assert_eq!(lines[1], "ERR 1 ballot box not logged in");
    assert!(lines[2].starts_with("OK B1 queued 0"));
}

#[tokio::test]
async fn test_login_checks_identifier_state_and_period() {
    let fixture = ElectionFixture::new();
    assert_eq!(codes_for(&fixture, &["login B9", "login B1"]).await, vec![2, 0]);

    fixture
        .store
        .set_ballot_box_state(fixture.ballot_box.ballot_box_id, BallotBoxState::Returned)
        .unwrap();
    assert_eq!(codes_for(&fixture, &["login B1"]).await, vec![11]);

    fixture
        .store
        .set_ballot_box_state(fixture.ballot_box.ballot_box_id, BallotBoxState::Emitted)
        .unwrap();
    fixture.clock.advance(chrono::Duration::hours(2));
    assert_eq!(codes_for(&fixture, &["login B1", "lookup 1001"]).await, vec![11, 1]);
}

#[tokio::test]
async fn test_full_ballot() {
    let fixture = ElectionFixture::new();
    let (result, transcript) = converse(
        &fixture,
        ScriptedStream::from_lines(&["login B1", "lookup 1001", "queue al", "commit", "status"]),
    )
    .await;

    assert_eq!(result.unwrap(), EngineOutcome::EndOfInput);
    let lines = transcript.lines();
    assert_eq!(lines[1], "OK logged in as Main hall");
    assert_eq!(
        lines[2],
        format!(
            "OK Alice Example may vote in: {}=V1",
            fixture.voting.voting_id
        )
    );
    assert_eq!(lines[3], "OK queued 1 votes");
    assert_eq!(lines[4], "OK committed 1 votes");
    assert_eq!(lines[5], "OK B1 queued 0 committed 1 total 1");
}

#[tokio::test]
async fn test_voter_facing_errors() {
    let fixture = ElectionFixture::new();
    let codes = codes_for(
        &fixture,
        &[
            "login B1",
            "check 1",
            "lookup 9999",
            "lookup 1001",
            "queue xx",
            "commit",
            "cancel",
            "check 424242",
            "queue al 424242",
        ],
    )
    .await;

    assert_eq!(codes, vec![0, 5, 6, 0, 4, 13, 13, 9, 9]);
}

#[tokio::test]
async fn test_already_voted() {
    let fixture = ElectionFixture::new();
    let check = format!("check {}", fixture.voting.voting_id);
    let queue = format!("queue al {}", fixture.voting.voting_id);

    let codes = codes_for(
        &fixture,
        &["login B1", "lookup 1001", "queue al", "commit", "lookup 1001", check.as_str(), queue.as_str(), "queue al"],
    )
    .await;

    assert_eq!(codes, vec![0, 0, 0, 0, 0, 8, 8, 8]);
}

#[tokio::test]
async fn test_discriminator_scoped_voting() {
    let fixture = ElectionFixture::new();
    let council = fixture.store.add_voting(NewVoting::scoped(
        fixture.election.election_id,
        "CS council",
        "department",
        DiscriminationMode::Allow,
        &["CS"],
    ));
    fixture.add_voter("Bob Builder", "1002", &[("department", "Math")]);
    fixture.add_voter("Carol Coder", "1003", &[("department", "CS")]);

    let check = format!("check {}", council.voting_id);
    let queue = format!("queue bo {}", council.voting_id);
    let (result, transcript) = converse(
        &fixture,
        ScriptedStream::from_lines(&[
            "login B1",
            "lookup 1002",
            check.as_str(),
            queue.as_str(),
            "lookup 1003",
            check.as_str(),
        ]),
    )
    .await;
    result.unwrap();

    let lines = transcript.lines();
    assert!(!lines[2].contains("CS council"));
    assert_eq!(transcript.codes()[3..].to_vec(), vec![7, 7, 0, 0]);
    assert!(lines[5].contains("CS council"));
}

#[tokio::test]
async fn test_queued_voter_must_be_resolved_first() {
    let fixture = ElectionFixture::new();
    fixture.add_voter("Bob Builder", "1002", &[]);

    let codes = codes_for(
        &fixture,
        &["login B1", "lookup 1001", "queue al", "queue al", "lookup 1002", "cancel", "commit", "lookup 1002"],
    )
    .await;

    assert_eq!(codes, vec![0, 0, 0, 12, 12, 0, 5, 0]);
    assert!(fixture.store.votes().is_empty());
}

#[tokio::test]
async fn test_lookup_orders_votings_by_group_then_name() {
    let fixture = ElectionFixture::new();
    let election_id = fixture.election.election_id;
    let assembly = fixture.store.add_voting_group(election_id, "Assembly");
    let board = fixture.store.add_voting_group(election_id, "Board");
    let grouped = |name: &str, group: i64| {
        let mut voting = NewVoting::unrestricted(election_id, name);
        voting.voting_group_id = Some(group);
        fixture.store.add_voting(voting)
    };
    let beta = grouped("Beta", board.voting_group_id);
    let alpha = grouped("Alpha", board.voting_group_id);
    let zeta = grouped("Zeta", assembly.voting_group_id);

    let (_, transcript) =
        converse(&fixture, ScriptedStream::from_lines(&["login B1", "lookup 1001"])).await;

    assert_eq!(
        transcript.lines()[2],
        format!(
            "OK Alice Example may vote in: {}=V1, {}=Zeta, {}=Alpha, {}=Beta",
            fixture.voting.voting_id, zeta.voting_id, alpha.voting_id, beta.voting_id
        )
    );
}

#[tokio::test]
async fn test_queue_without_ids_covers_open_votings() {
    let fixture = ElectionFixture::new();
    let v2 = add_voting(&fixture, "V2");

    let codes = codes_for(&fixture, &["login B1", "lookup 1001", "queue AL", "commit"]).await;

    assert_eq!(codes, vec![0, 0, 0, 0]);
    let votes = fixture.store.votes();
    assert_eq!(votes.len(), 2);
    assert!(votes.iter().all(|vote| vote.is_committed()));
    assert!(votes.iter().any(|vote| vote.voting_id == v2.voting_id));
}

#[tokio::test(start_paused = true)]
async fn test_end_of_input_keeps_queued_votes_for_next_session() {
    let fixture = ElectionFixture::new();
    let (result, _) = converse(
        &fixture,
        ScriptedStream::from_lines(&["login B1", "lookup 1001", "queue al"]),
    )
    .await;
    assert_eq!(result.unwrap(), EngineOutcome::EndOfInput);
    assert_eq!(fixture.store.votes().len(), 1);

    let (result, transcript) = converse(
        &fixture,
        ScriptedStream::from_lines(&["login B1", "lookup 1001", "commit"]),
    )
    .await;
    result.unwrap();

    let lines = transcript.lines();
    assert_eq!(lines[2], "OK Alice Example has 1 queued votes");
    assert_eq!(lines[3], "OK committed 1 votes");
    assert_eq!(fixture.reload_ballot_box().await.committed_votes_count(), 1);
}

#[tokio::test]
async fn test_voter_queued_at_another_box() {
    let fixture = ElectionFixture::new();
    let mut other_box = fixture.store.add_ballot_box(NewBallotBox {
        election_id: fixture.election.election_id,
        identifier: "B2".to_string(),
        name: "Library".to_string(),
        ssh_public_key: None,
        state: BallotBoxState::Emitted,
    });
    let mut voter = fixture.voter.clone();
    vote_service(&fixture)
        .create_vote(&mut other_box, &mut voter, &fixture.voting)
        .await
        .unwrap();

    assert_eq!(codes_for(&fixture, &["login B1", "lookup 1001"]).await, vec![0, 12]);
}

#[tokio::test]
async fn test_termination_notice_stops_the_loop() {
    let fixture = ElectionFixture::new();
    let services = fixture.services();
    let mut session = services
        .registry
        .start_session(&fixture.ballot_box)
        .await
        .unwrap();

    let signals = fixture.signals.clone();
    let record = session.record().clone();
    let stream = ScriptedStream::new()
        .line("login B1")
        .line("lookup 1001")
        .run(move || {
            signals
                .send(
                    ElectionFixture::PID,
                    &TerminationNotice::for_session(&record, Utc::now()),
                )
                .unwrap();
        })
        .line("queue al")
        .line("commit");
    let transcript = stream.transcript();

    let result = ProtocolEngine::new(
        services.context(),
        fixture.ballot_box.clone(),
        &mut session,
        stream,
    )
    .run()
    .await;

    assert!(matches!(result, Err(EngineError::SessionTerminated { .. })));
    assert_eq!(transcript.codes(), vec![0, 0, 0, 10]);
    assert!(fixture.store.votes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_session_ended_by_newer_connection_refuses_votes() {
    let fixture = ElectionFixture::new();
    let services = fixture.services();
    let mut session = services
        .registry
        .start_session(&fixture.ballot_box)
        .await
        .unwrap();
    let mut engine = ProtocolEngine::new(
        services.context(),
        fixture.ballot_box.clone(),
        &mut session,
        ScriptedStream::new(),
    );

    engine
        .dispatch(&Command::parse("login B1").unwrap())
        .await
        .unwrap();

    // A newer connection for the same box takes over
    fixture
        .registry()
        .start_session(&fixture.ballot_box)
        .await
        .unwrap();

    let result = engine.dispatch(&Command::parse("lookup 1001").unwrap()).await;
    assert!(matches!(result, Err(EngineError::SessionTerminated { .. })));

    // Status does not touch votes and still answers
    let status = engine.dispatch(&Command::Status).await.unwrap();
    assert!(matches!(status, Response::Ok(_)));
}

#[tokio::test]
async fn test_malformed_lines_are_answered() {
    let fixture = ElectionFixture::new();
    let (result, transcript) = converse(
        &fixture,
        ScriptedStream::new()
            .invalid(b"\xff\xfe")
            .line("vote 1")
            .line("")
            .line("QUIT")
            .line("status"),
    )
    .await;

    assert_eq!(result.unwrap(), EngineOutcome::Quit);
    assert_eq!(transcript.codes(), vec![0, 3, 3, 3, 0]);
    assert_eq!(transcript.last().as_deref(), Some("OK bye"));
}

#[test]
fn test_error_codes_match_catalogue() {
    assert_eq!(ProtocolErrorCode::NotLoggedIn.code(), 1);
    assert_eq!(ProtocolErrorCode::VerificationMismatch.code(), 4);
    assert_eq!(ProtocolErrorCode::VoterNotFound.code(), 6);
    assert_eq!(ProtocolErrorCode::AlreadyVoted.code(), 8);
    assert_eq!(ProtocolErrorCode::NotPermittedNow.code(), 11);
    assert_eq!(ProtocolErrorCode::VoterAlreadyQueued.code(), 12);
    assert_eq!(ProtocolErrorCode::VoterNotQueued.code(), 13);
}
