//! EventLog repository trait definition.

use cronflow_types::error::RepositoryError;
use cronflow_types::execution::Execution;
use cronflow_types::log::{EventLog, LogStatus};
use uuid::Uuid;

/// Repository trait for event log persistence.
///
/// The audit joins (`list_unlinked`, `list_orphaned`, `list_linked_pairs`)
/// are SQL-side in the infrastructure layer so the integrity engine never
/// has to page whole tables through memory.
pub trait LogRepository: Send + Sync {
    /// Insert a new log row.
    fn create(
        &self,
        log: &EventLog,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a log by ID.
    fn get(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<EventLog>, RepositoryError>> + Send;

    /// Set the log's execution reference and bump `updated_at`.
    ///
    /// Fails with [`RepositoryError::NotFound`] if the log does not exist.
    fn set_execution_id(
        &self,
        log_id: &Uuid,
        execution_id: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Rewrite the log's status (and optionally error text); bumps `updated_at`.
    ///
    /// `successful` is kept in sync: true for `success`/`partial`.
    fn update_status(
        &self,
        log_id: &Uuid,
        status: LogStatus,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Total number of log rows.
    fn count(
        &self,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Number of log rows with a non-null execution reference.
    fn count_linked(
        &self,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Logs with no execution reference, oldest first.
    ///
    /// `limit` of `None` returns every unlinked log (used by the batch
    /// repair); the audit passes a bounded sample size.
    fn list_unlinked(
        &self,
        limit: Option<u32>,
    ) -> impl std::future::Future<Output = Result<Vec<EventLog>, RepositoryError>> + Send;

    /// Logs whose `job_id` references a job that no longer exists.
    fn list_orphaned(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<EventLog>, RepositoryError>> + Send;

    /// Every log joined to its linked execution.
    ///
    /// Drives bulk reconciliation, which has to visit each pair.
    fn list_linked_pairs(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<(EventLog, Execution)>, RepositoryError>> + Send;

    /// Linked pairs whose log status disagrees with the execution status,
    /// per [`LogStatus::accepted_execution_statuses`]. The mismatch filter
    /// runs in the store so the audit fetches at most `limit` rows.
    ///
    /// [`LogStatus::accepted_execution_statuses`]: cronflow_types::log::LogStatus::accepted_execution_statuses
    fn list_mismatched_pairs(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<(EventLog, Execution)>, RepositoryError>> + Send;
}
