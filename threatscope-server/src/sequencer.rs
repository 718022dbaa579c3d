//! Event sequencer
//!
//! Translates execution-graph snapshots into the ordered wire event stream.
//! The sequencer owns the run's sequence counter and its reported-record set,
//! and is the only writer of the run's event log, so no locking is needed
//! beyond serializing `observe` calls per run.
//!
//! Every derived event is persisted before it is handed back for delivery;
//! a consumer can therefore always be reconstructed from the store. A store
//! failure is escalated to a run failure, never silently dropped.
//!
//! Stream invariants enforced here:
//! - `seq` starts at 1 and is gap-free per run
//! - exactly one `router_decision`, before any `record_done`
//! - one `record_done` per distinct record id
//! - at most one terminal event, always last

use std::collections::HashSet;
use std::sync::Arc;
use threatscope_common::events::{
    ErrorPayload, EventName, FinalSummaryPayload, RecordDonePayload, RouterDecisionPayload,
    SseEnvelope,
};
use threatscope_common::Result;
use tracing::warn;

use crate::graph::{GraphSnapshot, RunStats};
use crate::records::RecordKind;
use crate::store::{EventRecord, RunStatus, RunStore};

pub struct EventSequencer {
    store: Arc<dyn RunStore>,
    thread_id: String,
    seq: u64,
    router_sent: bool,
    reported: HashSet<String>,
    finished: bool,
}

impl EventSequencer {
    pub fn new(store: Arc<dyn RunStore>, thread_id: String) -> Self {
        Self {
            store,
            thread_id,
            seq: 0,
            router_sent: false,
            reported: HashSet::new(),
            finished: false,
        }
    }

    /// True once a terminal event has been emitted
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Derive, persist, and return the events exposed by one snapshot.
    ///
    /// An `Err` here means the store refused an append; the caller must treat
    /// it as a run failure (see [`fail`](Self::fail)).
    pub async fn observe(&mut self, snapshot: &GraphSnapshot) -> Result<Vec<SseEnvelope>> {
        let mut out = Vec::new();
        if self.finished {
            return Ok(out);
        }

        // First snapshot carrying per-kind counts: the routing decision
        if !self.router_sent {
            if let Some(stats) = snapshot.stats {
                out.push(self.emit_router_decision(&stats).await?);
                self.router_sent = true;
            }
        }

        // Newly accumulated records, deduplicated by id across snapshots
        for result in &snapshot.results {
            if self.reported.contains(&result.record_id) {
                continue;
            }
            let payload = RecordDonePayload {
                kind: result.kind.as_str().to_string(),
                id: result.record_id.clone(),
                summary: result.content.clone(),
            };
            let envelope = self.emit(EventName::RecordDone, to_value(&payload)?).await?;
            self.reported.insert(result.record_id.clone());
            out.push(envelope);
        }

        // Terminal snapshot: the synthesized report
        if let Some(report) = &snapshot.final_report {
            let payload = FinalSummaryPayload {
                summary: report.summary.clone(),
                expert_count: report.expert_count,
                total_processing_time_ms: report.total_processing_time_ms,
            };
            let envelope = self.emit(EventName::FinalSummary, to_value(&payload)?).await?;
            self.store
                .update_status(&self.thread_id, RunStatus::Completed, Some(&report.summary))
                .await?;
            self.finished = true;
            out.push(envelope);
        }

        Ok(out)
    }

    /// Terminate the run with an `error` event.
    ///
    /// Persisting the error event is best effort: when the store itself is
    /// what failed, the frame is still delivered so the stream never closes
    /// silently.
    pub async fn fail(&mut self, error_code: &str, message: &str) -> SseEnvelope {
        self.seq += 1;
        let payload = ErrorPayload::new(error_code, message);
        let envelope = SseEnvelope::new(
            EventName::Error,
            &self.thread_id,
            self.seq,
            serde_json::to_value(&payload).unwrap_or_default(),
        );

        if let Err(e) = self
            .store
            .append_event(&EventRecord::from_envelope(&envelope))
            .await
        {
            warn!(thread_id = %self.thread_id, error = %e, "Failed to persist error event");
        }
        if let Err(e) = self
            .store
            .update_status(&self.thread_id, RunStatus::Error, None)
            .await
        {
            warn!(thread_id = %self.thread_id, error = %e, "Failed to mark run as errored");
        }

        self.finished = true;
        envelope
    }

    async fn emit_router_decision(&mut self, stats: &RunStats) -> Result<SseEnvelope> {
        // Selected kinds derive from the counts, in canonical order; a kind
        // with no records gets no expert.
        let mut selected_experts = Vec::new();
        for kind in RecordKind::CANONICAL_ORDER {
            let count = match kind {
                RecordKind::Host => stats.host_count,
                RecordKind::Cert => stats.cert_count,
            };
            if count > 0 {
                selected_experts.push(kind.as_str().to_string());
            }
        }

        let payload = RouterDecisionPayload {
            selected_experts,
            reasoning: format!(
                "Router: {} hosts, {} certs - experts chosen accordingly",
                stats.host_count, stats.cert_count
            ),
            total_records: stats.total(),
        };
        self.emit(EventName::RouterDecision, to_value(&payload)?).await
    }

    /// Allocate the next seq, persist, and return the envelope.
    async fn emit(&mut self, event: EventName, payload: serde_json::Value) -> Result<SseEnvelope> {
        self.seq += 1;
        let envelope = SseEnvelope::new(event, &self.thread_id, self.seq, payload);
        match self
            .store
            .append_event(&EventRecord::from_envelope(&envelope))
            .await
        {
            Ok(()) => Ok(envelope),
            Err(e) => {
                // Roll the counter back so the terminal error event reuses
                // this seq and the stored sequence stays gap-free.
                self.seq -= 1;
                Err(e)
            }
        }
    }
}

/// Serialize a payload struct into the envelope's JSON body.
fn to_value<T: serde::Serialize>(payload: &T) -> Result<serde_json::Value> {
    serde_json::to_value(payload)
        .map_err(|e| threatscope_common::Error::Internal(format!("Payload serialization: {}", e)))
}
