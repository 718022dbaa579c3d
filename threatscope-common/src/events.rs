//! Wire event types for the threatscope streaming contract
//!
//! Every observable pipeline transition is delivered to callers as one SSE
//! frame and persisted as one stored event. The shapes in this module ARE the
//! wire contract shared with UI consumers; field names are stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event names emitted on a live stream
///
/// This set is closed: the sequencer emits exactly one `RouterDecision`
/// first, one `RecordDone` per analyzed record, and a single terminal
/// `FinalSummary` or `Error` as the last event of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    RouterDecision,
    RecordDone,
    FinalSummary,
    Error,
}

impl EventName {
    /// Wire name, as used in the SSE `event:` field and stored event rows
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::RouterDecision => "router_decision",
            EventName::RecordDone => "record_done",
            EventName::FinalSummary => "final_summary",
            EventName::Error => "error",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored-event type tag for incremental chunk rows
///
/// The live sequencer never emits this name. Chunk rows enter the store from
/// side-channel producers and are folded into synthesized `record_done`
/// events by compaction.
pub const RECORD_CHUNK: &str = "record_chunk";

/// Payload for `router_decision` events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterDecisionPayload {
    /// Record kinds with at least one record, in canonical kind order
    pub selected_experts: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
    pub total_records: usize,
}

/// Payload for `record_done` events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDonePayload {
    /// Record kind tag ("host" or "cert")
    pub kind: String,
    /// Record identity key (host IP or certificate fingerprint)
    pub id: String,
    pub summary: String,
}

/// Payload for `record_chunk` stored events (compaction input)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordChunkPayload {
    pub kind: String,
    pub id: String,
    pub chunk: String,
}

/// Payload for `final_summary` events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalSummaryPayload {
    pub summary: String,
    /// Number of individual record analyses behind the summary
    pub expert_count: usize,
    /// Sum of all workers' processing times
    pub total_processing_time_ms: u64,
}

/// Payload for `error` events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error_code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expert_id: Option<String>,
}

impl ErrorPayload {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
            expert_id: None,
        }
    }
}

/// One streamed event envelope
///
/// Serialized whole into the SSE `data:` field:
///
/// ```text
/// id: <seq>
/// event: <event>
/// data: <json SseEnvelope>
/// ```
///
/// `seq` is run-scoped, gap-free, and starts at 1; the `id:` field carries it
/// so clients can resume with `Last-Event-ID`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseEnvelope {
    pub event: EventName,
    pub thread_id: String,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl SseEnvelope {
    pub fn new(event: EventName, thread_id: &str, seq: u64, payload: serde_json::Value) -> Self {
        Self {
            event,
            thread_id: thread_id.to_string(),
            seq,
            timestamp: Utc::now(),
            payload,
        }
    }
}
