//! Job repository trait definition.

use cronflow_types::error::RepositoryError;
use cronflow_types::job::{Job, JobStatus};
use uuid::Uuid;

/// Repository trait for job persistence.
///
/// The external agent is the primary writer (claim/run/complete); the core
/// only reads jobs and creates them when events fire.
pub trait JobRepository: Send + Sync {
    /// Insert a new job row.
    fn create(
        &self,
        job: &Job,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a job by ID.
    fn get(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Job>, RepositoryError>> + Send;

    /// Update a job's status, attempt count, and last error.
    fn update_status(
        &self,
        id: &Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a job. Returns `true` if it existed.
    ///
    /// Only called from the owning event's cascade.
    fn delete(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
