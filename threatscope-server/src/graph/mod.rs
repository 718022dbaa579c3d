//! Execution graph
//!
//! The state machine driving one analysis run:
//!
//! ```text
//! start -> loaded -> routed -> {expert tasks in flight} -> merged -> done
//! ```
//!
//! The graph emits an observable [`GraphSnapshot`] after every transition and
//! after every accumulated worker result; the event sequencer consumes those
//! snapshots and derives the wire event stream from them. Fan-out is dynamic:
//! one concurrent task per record, sized at runtime, joined before the
//! reducer runs.
//!
//! Only infrastructure failures abort a run. Individual worker failures are
//! absorbed into degraded results by the experts and never reach this level.

pub mod accumulator;
pub mod classifier;
pub mod experts;
pub mod reducer;

use crate::provider::AnalysisProvider;
use crate::records::{RecordKind, RecordSource};
use accumulator::Accumulator;
use experts::{AnalysisContext, ProgressSink, WorkerResult};
use reducer::FinalReport;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Records sampled per kind for one run
pub const SAMPLE_PER_KIND: usize = 3;

/// Per-kind record counts for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub host_count: usize,
    pub cert_count: usize,
}

impl RunStats {
    pub fn total(&self) -> usize {
        self.host_count + self.cert_count
    }
}

/// Whole-run infrastructure failures
///
/// Anything surfacing here terminates the run with an `error` event; per
/// record failures never become a `GraphError`.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Record source failure: {0}")]
    RecordSource(#[source] threatscope_common::Error),

    #[error("Analysis task failure: {0}")]
    Task(String),
}

impl GraphError {
    /// Stable code carried in the `error` event payload
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::RecordSource(_) => "RECORD_SOURCE",
            GraphError::Task(_) => "ANALYSIS_TASK",
        }
    }
}

/// One observable state snapshot
///
/// Snapshots are cumulative views of the run state, so a consumer only ever
/// needs the latest one plus its own memory of what it already reported.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    /// Present from the `loaded` transition onward
    pub stats: Option<RunStats>,
    /// Present from the `routed` transition onward
    pub decision: Vec<RecordKind>,
    /// Accumulated worker results so far, arrival order
    pub results: Vec<WorkerResult>,
    /// Present only on the final (`done`) snapshot
    pub final_report: Option<FinalReport>,
}

/// The fan-out/fan-in execution graph for analysis runs
///
/// Holds the run-independent collaborators; each [`spawn`](Self::spawn)
/// starts one independent run.
pub struct ExecutionGraph {
    source: Arc<dyn RecordSource>,
    provider: Arc<dyn AnalysisProvider>,
    progress: ProgressSink,
    sample_per_kind: usize,
}

impl ExecutionGraph {
    pub fn new(source: Arc<dyn RecordSource>, provider: Arc<dyn AnalysisProvider>) -> Self {
        Self {
            source,
            provider,
            progress: ProgressSink::disabled(),
            sample_per_kind: SAMPLE_PER_KIND,
        }
    }

    /// Attach a best-effort progress sink handed to every worker.
    pub fn with_progress_sink(mut self, sink: ProgressSink) -> Self {
        self.progress = sink;
        self
    }

    /// Override the per-kind sample size (tests).
    pub fn with_sample_per_kind(mut self, sample_per_kind: usize) -> Self {
        self.sample_per_kind = sample_per_kind;
        self
    }

    /// Start one run.
    ///
    /// Snapshots arrive on the returned channel in transition order. The
    /// channel closes after the `done` snapshot; an infrastructure failure
    /// delivers one final `Err` instead. Dropping the receiver abandons the
    /// run.
    pub fn spawn(
        &self,
        original_message: String,
    ) -> mpsc::Receiver<Result<GraphSnapshot, GraphError>> {
        let (tx, rx) = mpsc::channel(32);
        let source = Arc::clone(&self.source);
        let provider = Arc::clone(&self.provider);
        let progress = self.progress.clone();
        let sample_per_kind = self.sample_per_kind;

        tokio::spawn(async move {
            if let Err(e) =
                drive(source, provider, progress, sample_per_kind, original_message, &tx).await
            {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }
}

/// Run the state machine to completion, emitting snapshots along the way.
async fn drive(
    source: Arc<dyn RecordSource>,
    provider: Arc<dyn AnalysisProvider>,
    progress: ProgressSink,
    sample_per_kind: usize,
    original_message: String,
    tx: &mpsc::Sender<Result<GraphSnapshot, GraphError>>,
) -> Result<(), GraphError> {
    // start -> loaded: sample the datasets
    let hosts: Vec<_> = source
        .get_all(RecordKind::Host)
        .await
        .map_err(GraphError::RecordSource)?
        .into_iter()
        .take(sample_per_kind)
        .collect();
    let certs: Vec<_> = source
        .get_all(RecordKind::Cert)
        .await
        .map_err(GraphError::RecordSource)?
        .into_iter()
        .take(sample_per_kind)
        .collect();

    let stats = RunStats {
        host_count: hosts.len(),
        cert_count: certs.len(),
    };
    info!(
        hosts = stats.host_count,
        certs = stats.cert_count,
        "Run loaded record samples"
    );

    let mut snapshot = GraphSnapshot {
        stats: Some(stats),
        ..Default::default()
    };
    if !emit(tx, &snapshot).await {
        return Ok(()); // consumer went away; abandon the run
    }

    // loaded -> routed
    let mut records = hosts;
    records.extend(certs);
    let classified = classifier::classify(records);
    snapshot.decision = classified.decision.clone();
    debug!(decision = ?snapshot.decision, "Routing decision made");
    if !emit(tx, &snapshot).await {
        return Ok(());
    }

    // routed -> in-flight: one concurrent task per record
    let ctx = Arc::new(AnalysisContext { original_message });
    let (result_tx, mut result_rx) = mpsc::channel::<WorkerResult>(64);
    let mut tasks = JoinSet::new();

    for record in classified.by_kind.into_values().flatten() {
        let provider = Arc::clone(&provider);
        let ctx = Arc::clone(&ctx);
        let sink = progress.clone();
        let result_tx = result_tx.clone();
        tasks.spawn(async move {
            let result = experts::analyze_record(provider.as_ref(), &record, &ctx, &sink).await;
            let _ = result_tx.send(result).await;
        });
    }
    drop(result_tx);

    // Accumulate results as they land; each retained result is observable
    // before the join barrier so callers see incremental progress.
    let mut accumulator = Accumulator::new();
    while let Some(result) = result_rx.recv().await {
        if accumulator.insert(result) {
            snapshot.results = accumulator.results().to_vec();
            if !emit(tx, &snapshot).await {
                return Ok(());
            }
        }
    }

    // in-flight -> merged: the join barrier. The result channel closing means
    // every task has settled; draining the JoinSet surfaces panics.
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            return Err(GraphError::Task(e.to_string()));
        }
    }

    // merged -> done: reduce exactly once
    let report = reducer::reduce(provider.as_ref(), accumulator.results(), &stats).await;
    snapshot.final_report = Some(report);
    emit(tx, &snapshot).await;
    info!(results = accumulator.len(), "Run complete");

    Ok(())
}

/// Send one snapshot; false when the consumer has gone away.
async fn emit(
    tx: &mpsc::Sender<Result<GraphSnapshot, GraphError>>,
    snapshot: &GraphSnapshot,
) -> bool {
    tx.send(Ok(snapshot.clone())).await.is_ok()
}
