//! Structured results for integrity audit and remediation operations.

use serde::Serialize;
use uuid::Uuid;

use cronflow_types::execution::{Execution, ExecutionStatus};
use cronflow_types::log::{EventLog, LogStatus};

/// Cap on sampled rows per audit category.
pub const SAMPLE_LIMIT: u32 = 100;

/// Read-only audit of the Job/Execution/Log trio.
///
/// Counts are exact; per-category samples are bounded at [`SAMPLE_LIMIT`]
/// rows so the audit stays cheap on large tables.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    /// Total log rows.
    pub total_logs: u64,
    /// Logs with a non-null execution reference.
    pub linked_logs: u64,
    /// Logs with no execution reference.
    pub unlinked_logs: u64,
    /// Total execution rows.
    pub total_executions: u64,
    /// Sample of unlinked logs.
    pub unlinked_sample: Vec<EventLog>,
    /// Sample of log/execution pairs with inconsistent statuses.
    pub mismatched_sample: Vec<MismatchedPair>,
    /// Sample of logs referencing a job that no longer exists.
    pub orphaned_logs_sample: Vec<EventLog>,
    /// Sample of executions referencing a job that no longer exists.
    pub orphaned_executions_sample: Vec<Execution>,
}

impl IntegrityReport {
    /// Whether the audit found nothing to remediate.
    pub fn is_healthy(&self) -> bool {
        self.unlinked_logs == 0
            && self.mismatched_sample.is_empty()
            && self.orphaned_logs_sample.is_empty()
            && self.orphaned_executions_sample.is_empty()
    }
}

/// A log whose terminal status disagrees with its execution's status.
#[derive(Debug, Clone, Serialize)]
pub struct MismatchedPair {
    pub log_id: Uuid,
    pub execution_id: String,
    pub log_status: LogStatus,
    pub execution_status: ExecutionStatus,
}

/// Counts from an orphan remediation pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OrphanCleanup {
    /// Logs marked failure with an ORPHANED marker.
    pub logs_marked: u64,
    /// Executions deleted outright.
    pub executions_deleted: u64,
    /// Rows that could not be remediated (error logged, batch continued).
    pub errors: u64,
}

/// Counts from a batch unlinked-log repair pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct UnlinkedRepair {
    /// Logs successfully linked to an existing or synthesized execution.
    pub repaired: u64,
    /// Logs that could not be repaired (error logged, batch continued).
    pub failed: u64,
}
