//! Result accumulator
//!
//! First-wins keyed accumulation of worker results. Arrival order carries no
//! meaning: the retained set is invariant under any interleaving, which is
//! what makes the concurrent fan-out safe to merge. Duplicate `record_id`s
//! are dropped here; this is the de-duplication point the event sequencer
//! relies on.

use super::experts::WorkerResult;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct Accumulator {
    results: Vec<WorkerResult>,
    seen: HashSet<String>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one result, keeping the first result per `record_id`.
    ///
    /// Returns true when the result was retained, false when a result for
    /// the same id already exists (the duplicate is dropped).
    pub fn insert(&mut self, result: WorkerResult) -> bool {
        if !self.seen.insert(result.record_id.clone()) {
            return false;
        }
        self.results.push(result);
        true
    }

    /// Retained results in arrival order
    pub fn results(&self) -> &[WorkerResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
