//! Run and event persistence
//!
//! Append-only event log per run plus run bookkeeping, behind the [`RunStore`]
//! trait so backends can be swapped without touching the pipeline. Two
//! backends ship: [`memory::MemoryStore`] for tests and single-process
//! deployments, and [`sqlite::SqliteStore`] for durable storage.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use threatscope_common::events::{SseEnvelope, RECORD_CHUNK};
use threatscope_common::Result;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Run lifecycle status
///
/// Transitions exactly once from `Streaming` to a terminal value; the status
/// is derived from which terminal event was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Streaming,
    Completed,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Streaming => "streaming",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "streaming" => Some(RunStatus::Streaming),
            "completed" => Some(RunStatus::Completed),
            "error" => Some(RunStatus::Error),
            _ => None,
        }
    }
}

/// One stored run with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_message: String,
    pub input_data: Value,
    pub status: RunStatus,
    pub final_summary: Option<String>,
    pub total_events: i64,
}

/// One stored event row
///
/// `event_type` is an open string at this layer: the live stream only ever
/// appends the four wire event names, but `record_chunk` rows from
/// side-channel producers are accepted and handled by compaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub thread_id: String,
    pub event_type: String,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl EventRecord {
    /// Create a stored row from a wire envelope.
    pub fn from_envelope(envelope: &SseEnvelope) -> Self {
        Self {
            id: Uuid::new_v4(),
            thread_id: envelope.thread_id.clone(),
            event_type: envelope.event.as_str().to_string(),
            seq: envelope.seq,
            timestamp: envelope.timestamp,
            payload: envelope.payload.clone(),
        }
    }
}

/// Persistence operations for runs and their event logs
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Create (or reset) a run; status starts as `Streaming` with no events.
    async fn create_run(
        &self,
        thread_id: &str,
        user_message: &str,
        input_data: Value,
    ) -> Result<RunRecord>;

    async fn get_run(&self, thread_id: &str) -> Result<Option<RunRecord>>;

    /// Set the run status and optionally the final summary.
    ///
    /// Returns false when the run does not exist.
    async fn update_status(
        &self,
        thread_id: &str,
        status: RunStatus,
        final_summary: Option<&str>,
    ) -> Result<bool>;

    /// Recent runs, most-recently-updated first.
    async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>>;

    /// Remove a run and all its events. Returns false when absent.
    async fn delete_run(&self, thread_id: &str) -> Result<bool>;

    /// Append one event to the run's log and bump its bookkeeping.
    async fn append_event(&self, event: &EventRecord) -> Result<()>;

    /// All events of a run, ascending by `seq`.
    async fn list_events(&self, thread_id: &str) -> Result<Vec<EventRecord>>;

    /// Compacted view of a run's events (see [`compact`]).
    async fn compact_events(&self, thread_id: &str) -> Result<Vec<EventRecord>> {
        Ok(compact(&self.list_events(thread_id).await?))
    }
}

/// Placeholder confidence carried by synthesized terminal events
const COMPACTED_CONFIDENCE: f64 = 0.85;
/// Placeholder processing time carried by synthesized terminal events
const COMPACTED_PROCESSING_TIME_MS: u64 = 500;

/// Fold incomplete chunk sequences into synthesized terminal events.
///
/// Input must be ascending by `seq` (as [`RunStore::list_events`] returns).
/// `record_chunk` rows are grouped by record id; a group whose record never
/// received a natural `record_done` is replaced by one synthesized
/// `record_done` whose summary concatenates the chunk contents in arrival
/// order. Groups that do have a terminal event are dropped without touching
/// that event. Synthesized events are deterministic — id from the group's
/// first chunk, timestamp from its last — which makes this function
/// idempotent: compacting a compacted log is a no-op.
pub fn compact(events: &[EventRecord]) -> Vec<EventRecord> {
    let mut kept: Vec<EventRecord> = Vec::with_capacity(events.len());
    // record_id -> chunks in arrival order; ids kept in first-seen order
    let mut chunk_groups: Vec<(String, Vec<&EventRecord>)> = Vec::new();
    let mut done_ids: Vec<String> = Vec::new();

    for event in events {
        if event.event_type == RECORD_CHUNK {
            let record_id = payload_str(&event.payload, "id").unwrap_or("unknown").to_string();
            match chunk_groups.iter_mut().find(|(id, _)| *id == record_id) {
                Some((_, chunks)) => chunks.push(event),
                None => chunk_groups.push((record_id, vec![event])),
            }
        } else {
            if event.event_type == "record_done" {
                if let Some(id) = payload_str(&event.payload, "id") {
                    done_ids.push(id.to_string());
                }
            }
            kept.push(event.clone());
        }
    }

    let mut next_seq = kept.iter().map(|e| e.seq).max().unwrap_or(0);

    for (record_id, chunks) in chunk_groups {
        if done_ids.iter().any(|done| *done == record_id) {
            // Unit already has its terminal event; the chunks fold into it.
            continue;
        }
        let first = chunks[0];
        let last = chunks[chunks.len() - 1];
        let summary: String = chunks
            .iter()
            .filter_map(|c| payload_str(&c.payload, "chunk"))
            .collect::<Vec<_>>()
            .join(" ");
        let kind = payload_str(&first.payload, "kind").unwrap_or("unknown").to_string();

        next_seq += 1;
        kept.push(EventRecord {
            id: first.id,
            thread_id: first.thread_id.clone(),
            event_type: "record_done".to_string(),
            seq: next_seq,
            timestamp: last.timestamp,
            payload: serde_json::json!({
                "kind": kind,
                "id": record_id,
                "summary": summary,
                "confidence": COMPACTED_CONFIDENCE,
                "processing_time_ms": COMPACTED_PROCESSING_TIME_MS,
            }),
        });
    }

    kept.sort_by_key(|e| e.seq);
    kept
}

fn payload_str<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}
