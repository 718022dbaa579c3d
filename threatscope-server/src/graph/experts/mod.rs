//! Analysis experts
//!
//! One worker variant per record kind. A worker is total: on any provider
//! failure it returns a degraded result embedding the error instead of
//! propagating it, so a single bad record can never abort a run.

pub mod cert;
pub mod host;

use crate::provider::AnalysisProvider;
use crate::records::{Record, RecordKind};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Confidence assigned to degraded fallback results
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Output of one expert for one record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    pub kind: RecordKind,
    pub record_id: String,
    pub content: String,
    /// 0.0-1.0
    pub confidence: f64,
    pub processing_time_ms: u64,
}

/// One incremental progress notification from a worker
#[derive(Debug, Clone)]
pub struct ProgressChunk {
    pub kind: RecordKind,
    pub record_id: String,
    pub content: String,
}

/// Best-effort side channel for incremental progress
///
/// Sends are fire-and-forget: a missing sink or a dropped receiver never
/// affects the worker's return value.
#[derive(Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressChunk>>,
}

impl ProgressSink {
    /// A sink that discards everything
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn attached(tx: mpsc::UnboundedSender<ProgressChunk>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn send(&self, chunk: ProgressChunk) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(chunk);
        }
    }
}

/// Context shared by all workers of one run
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    /// The caller's original message, forwarded for analysis focus
    pub original_message: String,
}

/// Dispatch one record to the expert for its kind
pub async fn analyze_record(
    provider: &dyn AnalysisProvider,
    record: &Record,
    ctx: &AnalysisContext,
    sink: &ProgressSink,
) -> WorkerResult {
    match record {
        Record::Host(host) => host::analyze(provider, host, ctx, sink).await,
        Record::Cert(cert) => cert::analyze(provider, cert, ctx, sink).await,
    }
}
