//! SQLite job repository implementation.
//!
//! The payload is stored as an internally-tagged JSON blob so existing agent
//! payloads round-trip unchanged.

use chrono::Utc;
use cronflow_core::repository::JobRepository;
use cronflow_types::error::RepositoryError;
use cronflow_types::job::{Job, JobStatus};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed implementation of `JobRepository`.
pub struct SqliteJobRepository {
    pool: DatabasePool,
}

impl SqliteJobRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct JobRow {
    id: String,
    event_id: String,
    user_id: String,
    status: String,
    priority: i32,
    payload: String,
    scheduled_for: String,
    agent_id: Option<String>,
    attempts: i64,
    last_error: Option<String>,
    metadata: String,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            user_id: row.try_get("user_id")?,
            status: row.try_get("status")?,
            priority: row.try_get("priority")?,
            payload: row.try_get("payload")?,
            scheduled_for: row.try_get("scheduled_for")?,
            agent_id: row.try_get("agent_id")?,
            attempts: row.try_get("attempts")?,
            last_error: row.try_get("last_error")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_job(self) -> Result<Job, RepositoryError> {
        let status: JobStatus = self
            .status
            .parse()
            .map_err(RepositoryError::Query)?;
        let payload = serde_json::from_str(&self.payload)
            .map_err(|e| RepositoryError::Query(format!("invalid job payload JSON: {e}")))?;
        let metadata = serde_json::from_str(&self.metadata)
            .map_err(|e| RepositoryError::Query(format!("invalid job metadata JSON: {e}")))?;

        Ok(Job {
            id: parse_uuid(&self.id)?,
            event_id: parse_uuid(&self.event_id)?,
            user_id: parse_uuid(&self.user_id)?,
            status,
            priority: self.priority,
            payload,
            scheduled_for: parse_datetime(&self.scheduled_for)?,
            agent_id: self.agent_id,
            attempts: self.attempts as u32,
            last_error: self.last_error,
            metadata,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// JobRepository impl
// ---------------------------------------------------------------------------

impl JobRepository for SqliteJobRepository {
    async fn create(&self, job: &Job) -> Result<(), RepositoryError> {
        let payload = serde_json::to_string(&job.payload)
            .map_err(|e| RepositoryError::Query(format!("serialize payload: {e}")))?;
        let metadata = serde_json::to_string(&job.metadata)
            .map_err(|e| RepositoryError::Query(format!("serialize metadata: {e}")))?;

        sqlx::query(
            r#"INSERT INTO jobs
               (id, event_id, user_id, status, priority, payload, scheduled_for,
                agent_id, attempts, last_error, metadata, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(job.id.to_string())
        .bind(job.event_id.to_string())
        .bind(job.user_id.to_string())
        .bind(job.status.as_str())
        .bind(job.priority)
        .bind(&payload)
        .bind(format_datetime(&job.scheduled_for))
        .bind(&job.agent_id)
        .bind(job.attempts as i64)
        .bind(&job.last_error)
        .bind(&metadata)
        .bind(format_datetime(&job.created_at))
        .bind(format_datetime(&job.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = JobRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_job()?))
            }
            None => Ok(None),
        }
    }

    async fn update_status(
        &self,
        id: &Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, last_error = COALESCE(?, last_error), updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
