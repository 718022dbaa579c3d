//! In-memory run store
//!
//! Reference backend for tests and single-process deployments; the SQLite
//! backend replaces it where durability across restarts matters.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use threatscope_common::Result;
use tokio::sync::RwLock;

use super::{EventRecord, RunRecord, RunStatus, RunStore};

#[derive(Default)]
pub struct MemoryStore {
    runs: RwLock<HashMap<String, RunRecord>>,
    events: RwLock<HashMap<String, Vec<EventRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn create_run(
        &self,
        thread_id: &str,
        user_message: &str,
        input_data: Value,
    ) -> Result<RunRecord> {
        let now = Utc::now();
        let run = RunRecord {
            thread_id: thread_id.to_string(),
            created_at: now,
            updated_at: now,
            user_message: user_message.to_string(),
            input_data,
            status: RunStatus::Streaming,
            final_summary: None,
            total_events: 0,
        };
        self.runs
            .write()
            .await
            .insert(thread_id.to_string(), run.clone());
        self.events
            .write()
            .await
            .insert(thread_id.to_string(), Vec::new());
        Ok(run)
    }

    async fn get_run(&self, thread_id: &str) -> Result<Option<RunRecord>> {
        Ok(self.runs.read().await.get(thread_id).cloned())
    }

    async fn update_status(
        &self,
        thread_id: &str,
        status: RunStatus,
        final_summary: Option<&str>,
    ) -> Result<bool> {
        let mut runs = self.runs.write().await;
        let Some(run) = runs.get_mut(thread_id) else {
            return Ok(false);
        };
        run.status = status;
        run.updated_at = Utc::now();
        if let Some(summary) = final_summary {
            run.final_summary = Some(summary.to_string());
        }
        Ok(true)
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut runs: Vec<RunRecord> = self.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn delete_run(&self, thread_id: &str) -> Result<bool> {
        let removed = self.runs.write().await.remove(thread_id).is_some();
        self.events.write().await.remove(thread_id);
        Ok(removed)
    }

    async fn append_event(&self, event: &EventRecord) -> Result<()> {
        self.events
            .write()
            .await
            .entry(event.thread_id.clone())
            .or_default()
            .push(event.clone());

        if let Some(run) = self.runs.write().await.get_mut(&event.thread_id) {
            run.total_events += 1;
            run.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_events(&self, thread_id: &str) -> Result<Vec<EventRecord>> {
        let mut events = self
            .events
            .read()
            .await
            .get(thread_id)
            .cloned()
            .unwrap_or_default();
        events.sort_by_key(|e| e.seq);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn event(thread_id: &str, seq: u64) -> EventRecord {
        EventRecord {
            id: Uuid::new_v4(),
            thread_id: thread_id.to_string(),
            event_type: "record_done".to_string(),
            seq,
            timestamp: Utc::now(),
            payload: serde_json::json!({"kind": "host", "id": format!("id-{}", seq)}),
        }
    }

    #[tokio::test]
    async fn test_run_lifecycle() {
        let store = MemoryStore::new();
        let run = store
            .create_run("t1", "analyze everything", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Streaming);
        assert_eq!(run.total_events, 0);

        store.append_event(&event("t1", 1)).await.unwrap();
        store.append_event(&event("t1", 2)).await.unwrap();

        let updated = store
            .update_status("t1", RunStatus::Completed, Some("summary text"))
            .await
            .unwrap();
        assert!(updated);

        let run = store.get_run("t1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.final_summary.as_deref(), Some("summary text"));
        assert_eq!(run.total_events, 2);

        assert!(store.delete_run("t1").await.unwrap());
        assert!(store.get_run("t1").await.unwrap().is_none());
        assert!(store.list_events("t1").await.unwrap().is_empty());
        assert!(!store.delete_run("t1").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_status_missing_run() {
        let store = MemoryStore::new();
        let updated = store
            .update_status("nope", RunStatus::Error, None)
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn test_list_runs_most_recent_first() {
        let store = MemoryStore::new();
        store.create_run("old", "m", serde_json::json!({})).await.unwrap();
        store.create_run("new", "m", serde_json::json!({})).await.unwrap();
        // Touch the older run so it becomes the most recently updated
        store.append_event(&event("old", 1)).await.unwrap();

        let runs = store.list_runs(10).await.unwrap();
        assert_eq!(runs[0].thread_id, "old");
        assert_eq!(runs[1].thread_id, "new");

        let limited = store.list_runs(1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_events_sorted_by_seq() {
        let store = MemoryStore::new();
        store.create_run("t1", "m", serde_json::json!({})).await.unwrap();
        store.append_event(&event("t1", 2)).await.unwrap();
        store.append_event(&event("t1", 1)).await.unwrap();
        let events = store.list_events("t1").await.unwrap();
        assert_eq!(events[0].seq, 1);
        assert_eq!(events[1].seq, 2);
    }
}
