//! SQLite event log repository implementation.
//!
//! The audit queries (`list_unlinked`, `list_orphaned`,
//! `list_mismatched_pairs`) run their joins and filters in SQL so audits
//! never page whole tables through memory. `list_linked_pairs` stays
//! unbounded on purpose; bulk reconciliation visits every pair.

use chrono::Utc;
use cronflow_core::repository::LogRepository;
use cronflow_types::error::RepositoryError;
use cronflow_types::execution::{Execution, ExecutionStatus};
use cronflow_types::log::{EventLog, LogStatus};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed implementation of `LogRepository`.
pub struct SqliteLogRepository {
    pool: DatabasePool,
}

impl SqliteLogRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct LogRow {
    id: String,
    event_id: String,
    workflow_id: Option<String>,
    job_id: Option<String>,
    execution_id: Option<String>,
    status: String,
    output: Option<String>,
    started_at: String,
    completed_at: Option<String>,
    duration_ms: Option<i64>,
    successful: bool,
    error: Option<String>,
    retry_count: i64,
    created_at: String,
    updated_at: String,
}

impl LogRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            workflow_id: row.try_get("workflow_id")?,
            job_id: row.try_get("job_id")?,
            execution_id: row.try_get("execution_id")?,
            status: row.try_get("status")?,
            output: row.try_get("output")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            duration_ms: row.try_get("duration_ms")?,
            successful: row.try_get("successful")?,
            error: row.try_get("error")?,
            retry_count: row.try_get("retry_count")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_log(self) -> Result<EventLog, RepositoryError> {
        let status: LogStatus = self
            .status
            .parse()
            .map_err(RepositoryError::Query)?;

        Ok(EventLog {
            id: parse_uuid(&self.id)?,
            event_id: parse_uuid(&self.event_id)?,
            workflow_id: self.workflow_id.as_deref().map(parse_uuid).transpose()?,
            job_id: self.job_id.as_deref().map(parse_uuid).transpose()?,
            execution_id: self.execution_id,
            status,
            output: self.output,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            duration_ms: self.duration_ms,
            successful: self.successful,
            error: self.error,
            retry_count: self.retry_count as u32,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// Execution columns aliased with an `x_` prefix so the linked-pairs join can
// read both halves from one row.
fn execution_from_joined_row(row: &sqlx::sqlite::SqliteRow) -> Result<Execution, RepositoryError> {
    let status_raw: String = row.try_get("x_status").map_err(query_error)?;
    let status: ExecutionStatus = status_raw.parse().map_err(RepositoryError::Query)?;
    let metadata_raw: String = row.try_get("x_metadata").map_err(query_error)?;
    let metadata = serde_json::from_str(&metadata_raw)
        .map_err(|e| RepositoryError::Query(format!("invalid execution metadata JSON: {e}")))?;

    let job_id: String = row.try_get("x_job_id").map_err(query_error)?;
    let server_id: Option<String> = row.try_get("x_server_id").map_err(query_error)?;
    let started_at: String = row.try_get("x_started_at").map_err(query_error)?;
    let completed_at: Option<String> = row.try_get("x_completed_at").map_err(query_error)?;
    let created_at: String = row.try_get("x_created_at").map_err(query_error)?;
    let updated_at: String = row.try_get("x_updated_at").map_err(query_error)?;

    Ok(Execution {
        id: row.try_get("x_id").map_err(query_error)?,
        job_id: parse_uuid(&job_id)?,
        server_id: server_id.as_deref().map(parse_uuid).transpose()?,
        status,
        started_at: parse_datetime(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_datetime).transpose()?,
        exit_code: row.try_get("x_exit_code").map_err(query_error)?,
        output: row.try_get("x_output").map_err(query_error)?,
        error: row.try_get("x_error").map_err(query_error)?,
        metadata,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

// ---------------------------------------------------------------------------
// LogRepository impl
// ---------------------------------------------------------------------------

impl LogRepository for SqliteLogRepository {
    async fn create(&self, log: &EventLog) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO event_logs
               (id, event_id, workflow_id, job_id, execution_id, status, output,
                started_at, completed_at, duration_ms, successful, error,
                retry_count, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(log.id.to_string())
        .bind(log.event_id.to_string())
        .bind(log.workflow_id.map(|w| w.to_string()))
        .bind(log.job_id.map(|j| j.to_string()))
        .bind(&log.execution_id)
        .bind(log.status.as_str())
        .bind(&log.output)
        .bind(format_datetime(&log.started_at))
        .bind(log.completed_at.as_ref().map(format_datetime))
        .bind(log.duration_ms)
        .bind(log.successful)
        .bind(&log.error)
        .bind(log.retry_count as i64)
        .bind(format_datetime(&log.created_at))
        .bind(format_datetime(&log.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<EventLog>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM event_logs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = LogRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_log()?))
            }
            None => Ok(None),
        }
    }

    async fn set_execution_id(
        &self,
        log_id: &Uuid,
        execution_id: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE event_logs SET execution_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(execution_id)
        .bind(format_datetime(&Utc::now()))
        .bind(log_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn update_status(
        &self,
        log_id: &Uuid,
        status: LogStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let successful = matches!(status, LogStatus::Success | LogStatus::Partial);

        let result = sqlx::query(
            r#"UPDATE event_logs
               SET status = ?,
                   successful = ?,
                   error = COALESCE(?, error),
                   updated_at = ?
               WHERE id = ?"#,
        )
        .bind(status.as_str())
        .bind(successful)
        .bind(error)
        .bind(format_datetime(&Utc::now()))
        .bind(log_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM event_logs")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(query_error)?;
        let n: i64 = row.try_get("n").map_err(query_error)?;
        Ok(n as u64)
    }

    async fn count_linked(&self) -> Result<u64, RepositoryError> {
        let row =
            sqlx::query("SELECT COUNT(*) AS n FROM event_logs WHERE execution_id IS NOT NULL")
                .fetch_one(&self.pool.reader)
                .await
                .map_err(query_error)?;
        let n: i64 = row.try_get("n").map_err(query_error)?;
        Ok(n as u64)
    }

    async fn list_unlinked(&self, limit: Option<u32>) -> Result<Vec<EventLog>, RepositoryError> {
        let rows = match limit {
            Some(limit) => {
                sqlx::query(
                    r#"SELECT * FROM event_logs
                       WHERE execution_id IS NULL
                       ORDER BY created_at ASC
                       LIMIT ?"#,
                )
                .bind(limit)
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT * FROM event_logs WHERE execution_id IS NULL ORDER BY created_at ASC",
                )
                .fetch_all(&self.pool.reader)
                .await
            }
        }
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                let r = LogRow::from_row(row).map_err(query_error)?;
                r.into_log()
            })
            .collect()
    }

    async fn list_orphaned(&self, limit: u32) -> Result<Vec<EventLog>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT l.* FROM event_logs l
               LEFT JOIN jobs j ON l.job_id = j.id
               WHERE l.job_id IS NOT NULL AND j.id IS NULL
               ORDER BY l.created_at ASC
               LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                let r = LogRow::from_row(row).map_err(query_error)?;
                r.into_log()
            })
            .collect()
    }

    async fn list_linked_pairs(&self) -> Result<Vec<(EventLog, Execution)>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT l.*,
                      x.id AS x_id, x.job_id AS x_job_id, x.server_id AS x_server_id,
                      x.status AS x_status, x.started_at AS x_started_at,
                      x.completed_at AS x_completed_at, x.exit_code AS x_exit_code,
                      x.output AS x_output, x.error AS x_error, x.metadata AS x_metadata,
                      x.created_at AS x_created_at, x.updated_at AS x_updated_at
               FROM event_logs l
               JOIN executions x ON l.execution_id = x.id
               ORDER BY l.created_at ASC"#,
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                let log = LogRow::from_row(row).map_err(query_error)?.into_log()?;
                let execution = execution_from_joined_row(row)?;
                Ok((log, execution))
            })
            .collect()
    }

    async fn list_mismatched_pairs(
        &self,
        limit: u32,
    ) -> Result<Vec<(EventLog, Execution)>, RepositoryError> {
        // Mirrors LogStatus::accepted_execution_statuses: log statuses with
        // an empty accepted set never mismatch.
        let rows = sqlx::query(
            r#"SELECT l.*,
                      x.id AS x_id, x.job_id AS x_job_id, x.server_id AS x_server_id,
                      x.status AS x_status, x.started_at AS x_started_at,
                      x.completed_at AS x_completed_at, x.exit_code AS x_exit_code,
                      x.output AS x_output, x.error AS x_error, x.metadata AS x_metadata,
                      x.created_at AS x_created_at, x.updated_at AS x_updated_at
               FROM event_logs l
               JOIN executions x ON l.execution_id = x.id
               WHERE (l.status = 'success' AND x.status <> 'completed')
                  OR (l.status = 'failure'
                      AND x.status NOT IN ('failed', 'timeout', 'cancelled'))
                  OR (l.status = 'timeout' AND x.status <> 'timeout')
               ORDER BY l.created_at ASC
               LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                let log = LogRow::from_row(row).map_err(query_error)?.into_log()?;
                let execution = execution_from_joined_row(row)?;
                Ok((log, execution))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
