//! End-to-end tests for the vote engine: validation, duplicate
//! suppression, transactional count maintenance, statistics, and live
//! update delivery.

use std::sync::Arc;

use live_poll::{Database, Poll, UpdateHub, VoteEngine, VoteError, VoteOutcome, VoteRequest};

async fn setup() -> (Arc<VoteEngine>, Poll) {
    let _ = env_logger::builder().is_test(true).try_init();

    let db = Arc::new(Database::in_memory().await.expect("in-memory db"));
    let poll = db
        .create_poll("Favorite programming language?", &["Rust", "Python", "Go"])
        .await
        .expect("seed poll");

    let engine = Arc::new(VoteEngine::new(db, Arc::new(UpdateHub::default())));
    (engine, poll)
}

fn request_for(option_id: i64, client: &str) -> VoteRequest {
    VoteRequest {
        option_id: Some(option_id.to_string()),
        client_token: Some(client.to_string()),
        ..VoteRequest::default()
    }
}

#[tokio::test]
async fn first_vote_is_recorded_and_counted() {
    let (engine, poll) = setup().await;
    let option_a = poll.options[0].option_id;

    let outcome = engine
        .submit_vote(&request_for(option_a, "u1"))
        .await
        .unwrap();

    let VoteOutcome::Recorded { new_count, snapshot } = outcome else {
        panic!("expected Recorded outcome");
    };
    assert_eq!(new_count, 1);
    assert_eq!(snapshot.total_votes, 1);
    assert_eq!(snapshot.options[0].vote_count, 1);
    assert_eq!(snapshot.options[0].percentage, 100.0);
    assert_eq!(snapshot.options[1].vote_count, 0);
    assert_eq!(snapshot.options[1].percentage, 0.0);
}

#[tokio::test]
async fn second_vote_by_same_client_is_suppressed_even_for_another_option() {
    let (engine, poll) = setup().await;
    let option_a = poll.options[0].option_id;
    let option_b = poll.options[1].option_id;

    let first = engine
        .submit_vote(&request_for(option_a, "u1"))
        .await
        .unwrap();
    assert!(first.was_recorded());

    // Same client, different option of the same poll: idempotent read, not
    // a second vote.
    let second = engine
        .submit_vote(&request_for(option_b, "u1"))
        .await
        .unwrap();
    let VoteOutcome::AlreadyVoted { snapshot } = second else {
        panic!("expected AlreadyVoted outcome");
    };
    assert_eq!(snapshot, first.snapshot().clone());
    assert_eq!(snapshot.options[0].vote_count, 1);
    assert_eq!(snapshot.options[1].vote_count, 0);
    assert_eq!(snapshot.total_votes, 1);

    // Exactly one vote row exists.
    let votes = engine.db().get_poll_votes(poll.poll_id).await.unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].client_id, "u1");
    assert_eq!(votes[0].option_id, option_a);
}

#[tokio::test]
async fn hundred_concurrent_distinct_clients_all_land() {
    let (engine, poll) = setup().await;
    let option_a = poll.options[0].option_id;

    let mut handles = Vec::new();
    for i in 0..100 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .submit_vote(&request_for(option_a, &format!("client-{i}")))
                .await
        }));
    }

    let mut counts = Vec::new();
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            VoteOutcome::Recorded { new_count, .. } => counts.push(new_count),
            VoteOutcome::AlreadyVoted { .. } => panic!("distinct clients must all record"),
        }
    }

    // No lost updates: the atomic increments hand out every count exactly
    // once.
    counts.sort_unstable();
    assert_eq!(counts, (1..=100).collect::<Vec<i64>>());

    let snapshot = engine.snapshot(poll.poll_id).await.unwrap();
    assert_eq!(snapshot.options[0].vote_count, 100);
    assert_eq!(snapshot.total_votes, 100);
}

#[tokio::test]
async fn hundred_concurrent_clients_land_on_a_file_backed_database() {
    let _ = env_logger::builder().is_test(true).try_init();

    // The production configuration, not the single-connection test store:
    // writers must queue rather than abort on the write-lock upgrade.
    let path = std::env::temp_dir().join(format!("live_poll_test_{}.db", std::process::id()));
    let db_url = format!("sqlite://{}", path.display());

    let db = Arc::new(Database::open(&db_url).await.expect("file-backed db"));
    let poll = db
        .create_poll("Favorite programming language?", &["Rust", "Python", "Go"])
        .await
        .expect("seed poll");
    let option_a = poll.options[0].option_id;
    let engine = Arc::new(VoteEngine::new(db, Arc::new(UpdateHub::default())));

    let mut handles = Vec::new();
    for i in 0..100 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .submit_vote(&request_for(option_a, &format!("client-{i}")))
                .await
        }));
    }

    let mut recorded = 0;
    for handle in handles {
        if handle.await.unwrap().expect("no transient failures").was_recorded() {
            recorded += 1;
        }
    }
    assert_eq!(recorded, 100);

    let snapshot = engine.snapshot(poll.poll_id).await.unwrap();
    assert_eq!(snapshot.options[0].vote_count, 100);
    assert_eq!(snapshot.total_votes, 100);
    let rows = engine.db().get_poll_votes(poll.poll_id).await.unwrap();
    assert_eq!(rows.len(), 100);

    drop(engine);
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }
}

#[tokio::test]
async fn concurrent_submissions_from_one_client_record_once() {
    let (engine, poll) = setup().await;
    let option_a = poll.options[0].option_id;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.submit_vote(&request_for(option_a, "same-client")).await
        }));
    }

    let mut recorded = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().was_recorded() {
            recorded += 1;
        }
    }
    assert_eq!(recorded, 1);

    let snapshot = engine.snapshot(poll.poll_id).await.unwrap();
    assert_eq!(snapshot.total_votes, 1);
}

#[tokio::test]
async fn vote_for_unknown_option_is_rejected_without_a_write() {
    let (engine, poll) = setup().await;

    let err = engine
        .submit_vote(&request_for(999999, "u1"))
        .await
        .unwrap_err();
    assert!(matches!(err, VoteError::OptionNotFound(999999)));
    assert!(err.is_client_fault());

    assert!(engine.db().get_poll_votes(poll.poll_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn shape_rejections_happen_before_any_lookup() {
    let (engine, _poll) = setup().await;

    let missing = VoteRequest {
        option_id: None,
        client_token: Some("u1".to_string()),
        ..VoteRequest::default()
    };
    assert!(matches!(
        engine.submit_vote(&missing).await.unwrap_err(),
        VoteError::MissingOption
    ));

    let malformed = VoteRequest {
        option_id: Some("not-a-number".to_string()),
        client_token: Some("u1".to_string()),
        ..VoteRequest::default()
    };
    assert!(matches!(
        engine.submit_vote(&malformed).await.unwrap_err(),
        VoteError::MalformedOption(raw) if raw == "not-a-number"
    ));
}

#[tokio::test]
async fn snapshot_reads_are_idempotent_between_votes() {
    let (engine, poll) = setup().await;
    let option_a = poll.options[0].option_id;

    engine
        .submit_vote(&request_for(option_a, "u1"))
        .await
        .unwrap();

    let first = engine.snapshot(poll.poll_id).await.unwrap();
    let second = engine.snapshot(poll.poll_id).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn empty_poll_snapshot_is_all_zeroes_not_an_error() {
    let (engine, poll) = setup().await;

    let snapshot = engine.snapshot(poll.poll_id).await.unwrap();
    assert_eq!(snapshot.total_votes, 0);
    assert_eq!(snapshot.options.len(), 3);
    assert!(snapshot.options.iter().all(|o| o.vote_count == 0));
    assert!(snapshot.options.iter().all(|o| o.percentage == 0.0));
}

#[tokio::test]
async fn snapshot_of_unknown_poll_is_not_found() {
    let (engine, _poll) = setup().await;
    assert!(matches!(
        engine.snapshot(424242).await.unwrap_err(),
        VoteError::PollNotFound(424242)
    ));
}

#[tokio::test]
async fn subscriber_sees_each_recorded_vote_once() {
    let (engine, poll) = setup().await;
    let option_a = poll.options[0].option_id;

    let mut rx = engine.hub().subscribe(poll.poll_id);

    engine
        .submit_vote(&request_for(option_a, "u1"))
        .await
        .unwrap();

    let update = rx.recv().await.unwrap();
    assert_eq!(update.total_votes, 1);
    assert_eq!(update.options[0].vote_count, 1);
    assert!(rx.try_recv().is_err());

    // A viewer connecting after the publish gets nothing retroactively but
    // can ask for a fresh snapshot.
    let mut late_rx = engine.hub().subscribe(poll.poll_id);
    assert!(late_rx.try_recv().is_err());
    let fresh = engine.snapshot(poll.poll_id).await.unwrap();
    assert_eq!(fresh, update);
}

#[tokio::test]
async fn duplicate_vote_publishes_nothing() {
    let (engine, poll) = setup().await;
    let option_a = poll.options[0].option_id;

    engine
        .submit_vote(&request_for(option_a, "u1"))
        .await
        .unwrap();

    let mut rx = engine.hub().subscribe(poll.poll_id);
    engine
        .submit_vote(&request_for(option_a, "u1"))
        .await
        .unwrap();

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn derived_client_identity_deduplicates_anonymous_voters() {
    let (engine, poll) = setup().await;
    let option_a = poll.options[0].option_id;

    let anonymous = |agent: &str| VoteRequest {
        option_id: Some(option_a.to_string()),
        client_token: None,
        remote_addr: "203.0.113.9".to_string(),
        user_agent: agent.to_string(),
    };

    assert!(engine.submit_vote(&anonymous("firefox")).await.unwrap().was_recorded());
    // Same origin and software string resolves to the same client.
    assert!(!engine.submit_vote(&anonymous("firefox")).await.unwrap().was_recorded());
    // Different software string is treated as a different client.
    assert!(engine.submit_vote(&anonymous("chrome")).await.unwrap().was_recorded());
}

#[tokio::test]
async fn clearing_votes_resets_counts_and_dedup_state() {
    let (engine, poll) = setup().await;
    let option_a = poll.options[0].option_id;

    engine
        .submit_vote(&request_for(option_a, "u1"))
        .await
        .unwrap();
    engine
        .submit_vote(&request_for(option_a, "u2"))
        .await
        .unwrap();

    let cleared = engine.db().clear_poll_votes(poll.poll_id).await.unwrap();
    assert_eq!(cleared, 2);

    let snapshot = engine.snapshot(poll.poll_id).await.unwrap();
    assert_eq!(snapshot.total_votes, 0);
    assert!(snapshot.options.iter().all(|o| o.vote_count == 0));

    // The reset also forgets who voted.
    assert!(engine
        .submit_vote(&request_for(option_a, "u1"))
        .await
        .unwrap()
        .was_recorded());
}

#[tokio::test]
async fn current_poll_is_the_first_created() {
    let (engine, poll) = setup().await;
    engine
        .db()
        .create_poll("Second poll", &["yes", "no"])
        .await
        .unwrap();

    let current = engine.current_snapshot().await.unwrap().unwrap();
    assert_eq!(current.poll_id, poll.poll_id);
    assert_eq!(current.title, "Favorite programming language?");
}

#[tokio::test]
async fn snapshot_wire_shape_matches_the_transport_contract() {
    let (engine, poll) = setup().await;
    let option_a = poll.options[0].option_id;

    engine
        .submit_vote(&request_for(option_a, "u1"))
        .await
        .unwrap();

    let snapshot = engine.snapshot(poll.poll_id).await.unwrap();
    let wire = serde_json::to_value(&snapshot).unwrap();

    assert_eq!(wire["poll_id"], poll.poll_id);
    assert_eq!(wire["title"], "Favorite programming language?");
    assert_eq!(wire["total_votes"], 1);
    assert_eq!(wire["options"][0]["label"], "Rust");
    assert_eq!(wire["options"][0]["vote_count"], 1);
    assert_eq!(wire["options"][0]["percentage"], 100.0);
}
