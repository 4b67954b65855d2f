//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod execution;
pub mod job;
pub mod log;
pub mod pool;
pub mod workflow;

use chrono::{DateTime, Utc};
use cronflow_types::error::RepositoryError;
use uuid::Uuid;

// Shared column codecs: UUIDs and RFC 3339 timestamps are stored as TEXT.

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn query_error(e: sqlx::Error) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(db.to_string())
        }
        _ => RepositoryError::Query(e.to_string()),
    }
}
