//! Run aggregator: folds per-node outcomes into the final run record.
//!
//! Parallel branches can complete within the same instant, so the counters
//! are atomics rather than plain fields behind read-modify-write.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use cronflow_types::workflow::{WorkflowExecution, WorkflowExecutionStatus};

// ---------------------------------------------------------------------------
// RunAggregator
// ---------------------------------------------------------------------------

/// Per-run outcome counters plus finalization.
///
/// `total` counts dispatched nodes (skipped nodes never ran and are not
/// counted). The final status rule is conservative: failure iff any reached
/// node failed.
pub struct RunAggregator {
    started_at: DateTime<Utc>,
    total: AtomicU32,
    succeeded: AtomicU32,
    failed: AtomicU32,
}

impl RunAggregator {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            total: AtomicU32::new(0),
            succeeded: AtomicU32::new(0),
            failed: AtomicU32::new(0),
        }
    }

    /// Record a node dispatch. Returns the dispatch count so far.
    pub fn record_dispatch(&self) -> u32 {
        self.total.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record a node's terminal outcome.
    pub fn record_outcome(&self, success: bool) {
        if success {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn failed_count(&self) -> u32 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Write the final counts, duration, and status onto the run record.
    ///
    /// `forced_failure` marks the run failed regardless of node outcomes
    /// (cancellation).
    pub fn finalize(&self, execution: &mut WorkflowExecution, forced_failure: bool) {
        let completed_at = Utc::now();
        execution.total_events = self.total.load(Ordering::SeqCst);
        execution.successful_events = self.succeeded.load(Ordering::SeqCst);
        execution.failed_events = self.failed.load(Ordering::SeqCst);
        execution.completed_at = Some(completed_at);
        execution.total_duration_ms =
            Some((completed_at - self.started_at).num_milliseconds());
        execution.status = if forced_failure || execution.failed_events > 0 {
            WorkflowExecutionStatus::Failure
        } else {
            WorkflowExecutionStatus::Success
        };
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
