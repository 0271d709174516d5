//! End-to-end ballot: election "E", box "B1", voting "V1", voter Alice.

use ballotbox_core::models::VoteState;
use ballotbox_core::protocol::EngineOutcome;
use ballotbox_core::runner::run_session;
use ballotbox_core::services::VoteService;
use ballotbox_core::test_helpers::{ElectionFixture, ScriptedStream};

#[tokio::test]
async fn test_alice_votes_through_b1() {
    let fixture = ElectionFixture::new();
    let service = VoteService::new(fixture.store.clone(), fixture.clock.clone());
    let mut ballot_box = fixture.ballot_box.clone();
    let mut voter = fixture.voter.clone();

    assert!(fixture.election.is_open(chrono::Utc::now()));
    assert!(ballot_box.ssh_public_key.is_none());

    let vote = service
        .create_vote(&mut ballot_box, &mut voter, &fixture.voting)
        .await
        .unwrap();
    assert_eq!(vote.state, VoteState::Queued);

    let committed = service
        .commit_pending_votes_for_voter(&mut ballot_box, &mut voter)
        .await
        .unwrap();

    assert_eq!(committed, 1);
    assert_eq!(ballot_box.committed_votes_count(), 1);
    assert_eq!(ballot_box.queued_votes_count(), 0);
    assert_eq!(service.committed_votes_count(&ballot_box).await.unwrap(), 1);
    assert_eq!(service.queued_votes_count(&ballot_box).await.unwrap(), 0);
}

#[tokio::test]
async fn test_alice_votes_over_the_line_protocol() {
    let fixture = ElectionFixture::new();
    let services = fixture.services();
    let stream =
        ScriptedStream::from_lines(&["login B1", "lookup 1001", "queue al", "commit", "quit"]);
    let transcript = stream.transcript();

    let outcome = run_session(&services, "B1", stream, std::future::pending())
        .await
        .unwrap();

    assert_eq!(outcome, EngineOutcome::Quit);
    assert_eq!(transcript.codes(), vec![0; 6]);

    let ballot_box = fixture.reload_ballot_box().await;
    assert_eq!(ballot_box.committed_votes_count(), 1);
    assert_eq!(ballot_box.queued_votes_count(), 0);
    assert_eq!(ballot_box.total_votes_count(), 1);
}
