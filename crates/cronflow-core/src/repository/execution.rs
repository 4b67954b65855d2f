//! Execution repository trait definition.

use cronflow_types::error::RepositoryError;
use cronflow_types::execution::{Execution, ExecutionStatus};
use uuid::Uuid;

/// Repository trait for execution persistence.
///
/// Besides plain CRUD this carries the targeted audit queries the integrity
/// engine needs: latest-per-job lookup, total counts, and the orphan join
/// (executions whose parent job row no longer exists).
pub trait ExecutionRepository: Send + Sync {
    /// Insert a new execution row.
    fn create(
        &self,
        execution: &Execution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an execution by its text ID.
    fn get(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Execution>, RepositoryError>> + Send;

    /// The most recent execution for a job, ordered by creation descending.
    fn latest_for_job(
        &self,
        job_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Execution>, RepositoryError>> + Send;

    /// Update an execution's status, exit code, output, and error.
    ///
    /// Bumps `updated_at`; sets `completed_at` when the status is terminal.
    fn update_status(
        &self,
        id: &str,
        status: ExecutionStatus,
        exit_code: Option<i32>,
        output: Option<&str>,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete an execution. Returns `true` if it existed.
    fn delete(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Total number of execution rows.
    fn count(
        &self,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Executions whose `job_id` references a job that no longer exists.
    fn list_orphaned(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Execution>, RepositoryError>> + Send;
}
