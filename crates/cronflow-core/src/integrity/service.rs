//! The integrity engine: repair, audit, and reconciliation operations.
//!
//! All batch operations are idempotent and safe to run concurrently with
//! ongoing agent writes -- they only ever move state toward agreement. Per-row
//! errors inside a batch are logged and counted, never thrown out of the
//! batch.

use chrono::Utc;
use cronflow_types::error::IntegrityError;
use cronflow_types::execution::{EXIT_SUCCESS, EXIT_TIMEOUT, Execution, ExecutionStatus};
use cronflow_types::log::{EventLog, LogStatus};
use serde_json::json;
use uuid::Uuid;

use crate::repository::{ExecutionRepository, JobRepository, LogRepository};

use super::report::{
    IntegrityReport, MismatchedPair, OrphanCleanup, SAMPLE_LIMIT, UnlinkedRepair,
};

/// Marker appended to a log's error text when its parent job has been deleted.
const ORPHANED_MARKER: &str = "ORPHANED";

// ---------------------------------------------------------------------------
// IntegrityService
// ---------------------------------------------------------------------------

/// Keeps Job/Execution/Log rows mutually consistent.
///
/// Generic over the three repository traits so it works with any storage
/// backend (SQLite, in-memory mock, etc.). Constructed once at process start
/// and passed by handle -- no ambient global state.
pub struct IntegrityService<J, E, L> {
    jobs: J,
    executions: E,
    logs: L,
}

impl<J, E, L> IntegrityService<J, E, L>
where
    J: JobRepository,
    E: ExecutionRepository,
    L: LogRepository,
{
    /// Create a new integrity service over the given repositories.
    pub fn new(jobs: J, executions: E, logs: L) -> Self {
        Self {
            jobs,
            executions,
            logs,
        }
    }

    // -----------------------------------------------------------------------
    // Linking and repair
    // -----------------------------------------------------------------------

    /// Set the log's execution reference.
    ///
    /// Fails with a not-found error if the log does not exist; the execution
    /// is not required to exist yet (the agent may still be writing it).
    pub async fn link_log_to_execution(
        &self,
        log_id: Uuid,
        execution_id: &str,
    ) -> Result<(), IntegrityError> {
        self.logs
            .set_execution_id(&log_id, execution_id)
            .await
            .map_err(|e| match e {
                cronflow_types::error::RepositoryError::NotFound => {
                    IntegrityError::LogNotFound(log_id)
                }
                other => IntegrityError::Repository(other),
            })?;

        tracing::debug!(log_id = %log_id, execution_id, "linked log to execution");
        Ok(())
    }

    /// Idempotent repair: guarantee the log has a backing execution.
    ///
    /// - Already linked: returns the existing execution ID.
    /// - Linked job exists: links the most recent execution for that job.
    /// - No execution exists: synthesizes one from the log's captured fields
    ///   and the parent job's status, tagged as recovery-created, preserving
    ///   the log's original timestamps so chronology is not falsified.
    ///
    /// This is the single recovery path for logs created before their
    /// execution was durably written (agent crash between the two writes).
    pub async fn ensure_log_has_execution(
        &self,
        log: &EventLog,
    ) -> Result<String, IntegrityError> {
        if let Some(execution_id) = &log.execution_id {
            return Ok(execution_id.clone());
        }

        let job_id = log.job_id.ok_or_else(|| {
            IntegrityError::InvalidState(format!(
                "log {} has no job; it cannot be backed by an execution",
                log.id
            ))
        })?;

        // Prefer an execution the agent already wrote.
        if let Some(execution) = self.executions.latest_for_job(&job_id).await? {
            self.logs.set_execution_id(&log.id, &execution.id).await?;
            tracing::info!(
                log_id = %log.id,
                execution_id = execution.id.as_str(),
                "linked log to existing execution"
            );
            return Ok(execution.id);
        }

        // Nothing there: synthesize one from what the log captured.
        let job = self
            .jobs
            .get(&job_id)
            .await?
            .ok_or(IntegrityError::JobNotFound(job_id))?;

        let execution = synthesize_execution(log, job_id, job.status.into());
        let execution_id = execution.id.clone();
        self.executions.create(&execution).await?;
        self.logs.set_execution_id(&log.id, &execution_id).await?;

        tracing::warn!(
            log_id = %log.id,
            job_id = %job_id,
            execution_id = execution_id.as_str(),
            "synthesized recovery execution for unlinked log"
        );

        Ok(execution_id)
    }

    /// Repair every unlinked log. One row's failure never aborts the batch.
    pub async fn fix_unlinked_logs(&self) -> Result<UnlinkedRepair, IntegrityError> {
        let unlinked = self.logs.list_unlinked(None).await?;
        let mut result = UnlinkedRepair::default();

        for log in &unlinked {
            match self.ensure_log_has_execution(log).await {
                Ok(_) => result.repaired += 1,
                Err(e) => {
                    result.failed += 1;
                    tracing::warn!(log_id = %log.id, error = %e, "failed to repair unlinked log");
                }
            }
        }

        tracing::info!(
            repaired = result.repaired,
            failed = result.failed,
            "unlinked log repair pass finished"
        );
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Audit
    // -----------------------------------------------------------------------

    /// Read-only audit of the trio. Never writes.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, IntegrityError> {
        let total_logs = self.logs.count().await?;
        let linked_logs = self.logs.count_linked().await?;
        let total_executions = self.executions.count().await?;

        let unlinked_sample = self.logs.list_unlinked(Some(SAMPLE_LIMIT)).await?;
        let orphaned_logs_sample = self.logs.list_orphaned(SAMPLE_LIMIT).await?;
        let orphaned_executions_sample = self.executions.list_orphaned(SAMPLE_LIMIT).await?;

        let mismatched_sample = self
            .logs
            .list_mismatched_pairs(SAMPLE_LIMIT)
            .await?
            .into_iter()
            .map(|(log, execution)| MismatchedPair {
                log_id: log.id,
                execution_id: execution.id,
                log_status: log.status,
                execution_status: execution.status,
            })
            .collect();

        Ok(IntegrityReport {
            total_logs,
            linked_logs,
            unlinked_logs: total_logs - linked_logs,
            total_executions,
            unlinked_sample,
            mismatched_sample,
            orphaned_logs_sample,
            orphaned_executions_sample,
        })
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Rewrite log statuses from their authoritative executions.
    ///
    /// Only pairs where the execution was updated more recently than the log
    /// are considered. Running never overwrites a terminal log status.
    /// Returns the number of rows changed; a second call with no new
    /// divergence changes zero rows.
    pub async fn reconcile_statuses(&self) -> Result<u64, IntegrityError> {
        let pairs = self.logs.list_linked_pairs().await?;
        let mut changed = 0u64;

        for (log, execution) in pairs {
            if execution.updated_at <= log.updated_at {
                continue;
            }
            let Some(derived) = LogStatus::from_execution(execution.status, execution.exit_code)
            else {
                continue;
            };
            if derived == log.status {
                continue;
            }
            if derived == LogStatus::Running && log.status.is_terminal() {
                continue;
            }

            match self.logs.update_status(&log.id, derived, None).await {
                Ok(()) => {
                    changed += 1;
                    tracing::debug!(
                        log_id = %log.id,
                        from = log.status.as_str(),
                        to = derived.as_str(),
                        execution_id = execution.id.as_str(),
                        "reconciled log status"
                    );
                }
                Err(e) => {
                    tracing::warn!(log_id = %log.id, error = %e, "failed to reconcile log status");
                }
            }
        }

        if changed > 0 {
            tracing::info!(changed, "status reconciliation pass finished");
        }
        Ok(changed)
    }

    // -----------------------------------------------------------------------
    // Orphan remediation
    // -----------------------------------------------------------------------

    /// Remediate rows whose parent job no longer exists.
    ///
    /// Orphaned logs are marked `failure` with an ORPHANED marker appended to
    /// their error text (once -- re-running does not stack markers).
    /// Orphaned executions are deleted: their existence with no parent is not
    /// independently meaningful.
    pub async fn cleanup_orphans(&self) -> Result<OrphanCleanup, IntegrityError> {
        let mut result = OrphanCleanup::default();

        for log in self.logs.list_orphaned(u32::MAX).await? {
            if log
                .error
                .as_deref()
                .is_some_and(|e| e.contains(ORPHANED_MARKER))
            {
                continue;
            }
            let job_id = log
                .job_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "<unknown>".to_string());
            let marker = format!("{ORPHANED_MARKER}: parent job {job_id} no longer exists");
            let error = match log.error.as_deref() {
                Some(existing) => format!("{existing}\n{marker}"),
                None => marker,
            };

            match self
                .logs
                .update_status(&log.id, LogStatus::Failure, Some(&error))
                .await
            {
                Ok(()) => result.logs_marked += 1,
                Err(e) => {
                    result.errors += 1;
                    tracing::warn!(log_id = %log.id, error = %e, "failed to mark orphaned log");
                }
            }
        }

        for execution in self.executions.list_orphaned(u32::MAX).await? {
            match self.executions.delete(&execution.id).await {
                Ok(_) => result.executions_deleted += 1,
                Err(e) => {
                    result.errors += 1;
                    tracing::warn!(
                        execution_id = execution.id.as_str(),
                        error = %e,
                        "failed to delete orphaned execution"
                    );
                }
            }
        }

        tracing::info!(
            logs_marked = result.logs_marked,
            executions_deleted = result.executions_deleted,
            errors = result.errors,
            "orphan cleanup pass finished"
        );
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Recovery execution synthesis
// ---------------------------------------------------------------------------

/// Build a recovery execution from a log's captured fields.
///
/// The log's own timestamps become the execution's, so the synthesized row
/// does not falsify chronology. Metadata carries a recovery tag.
fn synthesize_execution(log: &EventLog, job_id: Uuid, status: ExecutionStatus) -> Execution {
    let mut metadata = std::collections::HashMap::new();
    metadata.insert("recovery".to_string(), json!(true));
    metadata.insert(
        "recovery_reason".to_string(),
        json!("synthesized for unlinked log"),
    );
    metadata.insert("log_id".to_string(), json!(log.id.to_string()));

    Execution {
        id: Execution::derive_id(job_id, log.created_at),
        job_id,
        server_id: None,
        status,
        started_at: log.started_at,
        completed_at: log.completed_at,
        exit_code: exit_code_hint(log.status),
        output: log.output.clone(),
        error: log.error.clone(),
        metadata,
        created_at: log.created_at,
        updated_at: Utc::now(),
    }
}

/// Best-effort exit code implied by a log's terminal status.
fn exit_code_hint(status: LogStatus) -> Option<i32> {
    match status {
        LogStatus::Success => Some(EXIT_SUCCESS),
        LogStatus::Timeout => Some(EXIT_TIMEOUT),
        LogStatus::Failure => Some(1),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
