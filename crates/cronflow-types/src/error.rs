use thiserror::Error;
use uuid::Uuid;

/// Errors from repository operations (used by trait definitions in cronflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the integrity (consistency) subsystem.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("log not found: {0}")]
    LogNotFound(Uuid),

    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    /// Operation preconditions violated, e.g. repairing a jobless log.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Errors from workflow graph validation.
///
/// These are the only errors fatal at workflow-start time; everything that
/// happens after dispatch is recorded per node, never thrown.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("cycle detected involving node {0}")]
    CycleDetected(Uuid),

    #[error("connection {connection_id} references unknown node {node_id}")]
    DanglingNode { connection_id: Uuid, node_id: Uuid },

    #[error("workflow has no nodes")]
    Empty,
}
