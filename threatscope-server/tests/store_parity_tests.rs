//! Backend parity tests
//!
//! The memory and SQLite stores must be interchangeable behind `RunStore`:
//! the same operation sequence yields the same observable state, and
//! compaction behaves identically (and idempotently) over both.

use chrono::Utc;
use std::sync::Arc;
use threatscope_server::store::{
    EventRecord, MemoryStore, RunStatus, RunStore, SqliteStore,
};
use uuid::Uuid;

fn chunk(thread_id: &str, seq: u64, id: &str, text: &str) -> EventRecord {
    EventRecord {
        id: Uuid::new_v4(),
        thread_id: thread_id.to_string(),
        event_type: "record_chunk".to_string(),
        seq,
        timestamp: Utc::now(),
        payload: serde_json::json!({"kind": "cert", "id": id, "chunk": text}),
    }
}

fn done(thread_id: &str, seq: u64, id: &str) -> EventRecord {
    EventRecord {
        id: Uuid::new_v4(),
        thread_id: thread_id.to_string(),
        event_type: "record_done".to_string(),
        seq,
        timestamp: Utc::now(),
        payload: serde_json::json!({"kind": "cert", "id": id, "summary": "complete"}),
    }
}

/// Run the same scenario against any backend and assert the same outcomes.
async fn exercise(store: Arc<dyn RunStore>) {
    // Lifecycle
    store
        .create_run("t1", "message", serde_json::json!({"k": "v"}))
        .await
        .unwrap();
    store.append_event(&done("t1", 1, "finished-unit")).await.unwrap();
    store.append_event(&chunk("t1", 2, "orphan-unit", "part a")).await.unwrap();
    store.append_event(&chunk("t1", 3, "orphan-unit", "part b")).await.unwrap();
    store
        .update_status("t1", RunStatus::Completed, Some("done"))
        .await
        .unwrap();

    let run = store.get_run("t1").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.total_events, 3);
    assert_eq!(run.input_data["k"], "v");

    let events = store.list_events("t1").await.unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].seq, 1);

    // Compaction folds the orphan and keeps the finished unit
    let compacted = store.compact_events("t1").await.unwrap();
    assert_eq!(compacted.len(), 2);
    assert_eq!(compacted[0].payload["id"], "finished-unit");
    let synthesized = &compacted[1];
    assert_eq!(synthesized.event_type, "record_done");
    assert_eq!(synthesized.payload["id"], "orphan-unit");
    assert_eq!(synthesized.payload["summary"], "part a part b");

    // Idempotency: compacting the compacted view changes nothing
    let again = threatscope_server::store::compact(&compacted);
    assert_eq!(again, compacted);

    // Terminal-event uniqueness per unit survives compaction
    let done_for_finished = compacted
        .iter()
        .filter(|e| e.event_type == "record_done" && e.payload["id"] == "finished-unit")
        .count();
    assert_eq!(done_for_finished, 1);

    // Deletion removes the run everywhere
    assert!(store.delete_run("t1").await.unwrap());
    assert!(store.get_run("t1").await.unwrap().is_none());
    assert!(store.list_runs(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_memory_store_contract() {
    exercise(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn test_sqlite_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::connect(&dir.path().join("parity.db"))
        .await
        .unwrap();
    exercise(Arc::new(store)).await;
}
