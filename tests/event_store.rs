//! Event Store Integration Tests
//!
//! Tests for event log format, append operations, and replay order.

use omniwire::core::{generate_idempotency_key, transaction_key, EventStore};
use omniwire::domain::{Address, Eid, Event, EventType, PendingTransaction, Point, Run, RunState, Status};
use tempfile::TempDir;
use uuid::Uuid;

fn transaction(eid: u32, data: &[u8]) -> PendingTransaction {
    PendingTransaction::new(
        Point::new(Eid(eid), Address::parse("0xe1").unwrap()),
        data.to_vec(),
        "Register library 0x51",
    )
}

#[tokio::test]
async fn test_event_append_format() {
    let run_id = Uuid::new_v4();

    let event = Event::new(
        run_id,
        Some(Eid(30101)),
        EventType::TransactionConfirmed,
        format!("{}:30101:abc123", run_id),
        "Set verifier signers".to_string(),
        Status::Completed,
    )
    .with_hash("0xfeed".to_string());

    let json = serde_json::to_string(&event).unwrap();
    let parsed: Event = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.run_id, run_id);
    assert_eq!(parsed.eid, Some(Eid(30101)));
    assert_eq!(parsed.event_type, EventType::TransactionConfirmed);
    assert!(parsed.idempotency_key.contains("30101"));
    assert_eq!(parsed.status, Status::Completed);
    assert_eq!(parsed.hash.as_deref(), Some("0xfeed"));

    // Verify timestamp is valid ISO 8601
    let timestamp_str = parsed.timestamp.to_rfc3339();
    assert!(timestamp_str.contains('T'));

    // Event types are written in snake case
    assert!(json.contains("\"transaction_confirmed\""));
}

#[tokio::test]
async fn test_event_types_serialization() {
    let event_types = vec![
        EventType::RunStarted,
        EventType::PlanComputed,
        EventType::TransactionConfirmed,
        EventType::TransactionFailed,
        EventType::TransactionSkipped,
        EventType::RunCompleted,
        EventType::RunFailed,
        EventType::SafetyLimitReached,
    ];

    for event_type in event_types {
        let json = serde_json::to_string(&event_type).unwrap();
        let parsed: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event_type);
    }
}

#[test]
fn test_transaction_key_format() {
    let run_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
    let key = transaction_key(run_id, &transaction(30101, b"payload"));

    // Format: {run_id}:{eid}:{data_hash}
    let parts: Vec<&str> = key.split(':').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "550e8400-e29b-41d4-a716-446655440000");
    assert_eq!(parts[1], "30101");
    assert_eq!(parts[2].len(), 16);

    assert_eq!(key, generate_idempotency_key(run_id, Eid(30101), parts[2]));
}

#[test]
fn test_transaction_key_different_payloads() {
    let run_id = Uuid::new_v4();

    let key1 = transaction_key(run_id, &transaction(1, b"a"));
    let key2 = transaction_key(run_id, &transaction(1, b"b"));
    let key3 = transaction_key(run_id, &transaction(2, b"a"));

    // Different payloads should produce different keys
    assert_ne!(key1, key2);

    // Different chains should produce different keys
    assert_ne!(key1, key3);

    // Same payload on the same chain is the same key
    assert_eq!(key1, transaction_key(run_id, &transaction(1, b"a")));
}

#[tokio::test]
async fn test_event_replay_order() {
    let temp_dir = TempDir::new().unwrap();
    let run_id = Uuid::new_v4();
    let store = EventStore::open_in(temp_dir.path(), run_id).await.unwrap();

    for i in 0..5u32 {
        let event = Event::new(
            run_id,
            Some(Eid(i)),
            EventType::TransactionConfirmed,
            format!("{}:{}:abc", run_id, i),
            format!("Transaction {}", i),
            Status::Completed,
        );
        store.append(&event).await.unwrap();
    }

    let events = store.replay().await.unwrap();
    assert_eq!(events.len(), 5);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.eid, Some(Eid(i as u32)));
    }

    // One JSON object per line
    let content = std::fs::read_to_string(store.events_path()).unwrap();
    assert_eq!(content.lines().count(), 5);
}

#[tokio::test]
async fn test_replayed_run_state() {
    let temp_dir = TempDir::new().unwrap();
    let run_id = Uuid::new_v4();
    let store = EventStore::open_in(temp_dir.path(), run_id).await.unwrap();

    let events = vec![
        Event::new(run_id, None, EventType::RunStarted, format!("{}:start", run_id), "Run started".to_string(), Status::Running),
        Event::new(run_id, None, EventType::PlanComputed, format!("{}:plan", run_id), "3 transactions planned".to_string(), Status::Running),
        Event::new(run_id, Some(Eid(1)), EventType::TransactionConfirmed, "a".to_string(), "tx a".to_string(), Status::Completed)
            .with_hash("0x01".to_string()),
        Event::new(run_id, Some(Eid(1)), EventType::TransactionFailed, "b".to_string(), "tx b".to_string(), Status::Failed)
            .with_error("submit failed: nonce too low".to_string()),
        Event::new(run_id, Some(Eid(1)), EventType::TransactionSkipped, "c".to_string(), "tx c".to_string(), Status::Skipped),
        Event::new(run_id, None, EventType::RunCompleted, format!("{}:complete", run_id), "1 of 3 transactions confirmed".to_string(), Status::Failed),
    ];
    for event in &events {
        store.append(event).await.unwrap();
    }

    let run = Run::from_events(&store.replay().await.unwrap()).unwrap();
    assert_eq!(run.id, run_id);
    assert_eq!(run.planned, 3);
    assert_eq!(run.state, RunState::PartiallyCompleted);
    assert_eq!(run.hashes.get("a").map(String::as_str), Some("0x01"));
    assert_eq!(run.transactions.get("a"), Some(&Status::Completed));
    assert_eq!(run.transactions.get("b"), Some(&Status::Failed));
    assert_eq!(run.count(Status::Skipped), 1);
}

#[tokio::test]
async fn test_list_runs_ignores_foreign_directories() {
    let temp_dir = TempDir::new().unwrap();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    EventStore::open_in(temp_dir.path(), first).await.unwrap();
    EventStore::open_in(temp_dir.path(), second).await.unwrap();
    std::fs::create_dir(temp_dir.path().join("not-a-run")).unwrap();

    let mut runs = EventStore::list_runs_in(temp_dir.path()).await.unwrap();
    runs.sort();
    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(runs, expected);

    let missing = temp_dir.path().join("missing");
    assert!(EventStore::list_runs_in(&missing).await.unwrap().is_empty());
}
