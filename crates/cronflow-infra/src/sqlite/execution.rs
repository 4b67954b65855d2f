//! SQLite execution repository implementation.

use chrono::Utc;
use cronflow_core::repository::ExecutionRepository;
use cronflow_types::error::RepositoryError;
use cronflow_types::execution::{Execution, ExecutionStatus};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed implementation of `ExecutionRepository`.
pub struct SqliteExecutionRepository {
    pool: DatabasePool,
}

impl SqliteExecutionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct ExecutionRow {
    id: String,
    job_id: String,
    server_id: Option<String>,
    status: String,
    started_at: String,
    completed_at: Option<String>,
    exit_code: Option<i32>,
    output: Option<String>,
    error: Option<String>,
    metadata: String,
    created_at: String,
    updated_at: String,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            server_id: row.try_get("server_id")?,
            status: row.try_get("status")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            exit_code: row.try_get("exit_code")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_execution(self) -> Result<Execution, RepositoryError> {
        let status: ExecutionStatus = self
            .status
            .parse()
            .map_err(RepositoryError::Query)?;
        let metadata = serde_json::from_str(&self.metadata)
            .map_err(|e| RepositoryError::Query(format!("invalid execution metadata JSON: {e}")))?;

        Ok(Execution {
            id: self.id,
            job_id: parse_uuid(&self.job_id)?,
            server_id: self.server_id.as_deref().map(parse_uuid).transpose()?,
            status,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            exit_code: self.exit_code,
            output: self.output,
            error: self.error,
            metadata,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// ExecutionRepository impl
// ---------------------------------------------------------------------------

impl ExecutionRepository for SqliteExecutionRepository {
    async fn create(&self, execution: &Execution) -> Result<(), RepositoryError> {
        let metadata = serde_json::to_string(&execution.metadata)
            .map_err(|e| RepositoryError::Query(format!("serialize metadata: {e}")))?;

        sqlx::query(
            r#"INSERT INTO executions
               (id, job_id, server_id, status, started_at, completed_at,
                exit_code, output, error, metadata, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&execution.id)
        .bind(execution.job_id.to_string())
        .bind(execution.server_id.map(|s| s.to_string()))
        .bind(execution.status.as_str())
        .bind(format_datetime(&execution.started_at))
        .bind(execution.completed_at.as_ref().map(format_datetime))
        .bind(execution.exit_code)
        .bind(&execution.output)
        .bind(&execution.error)
        .bind(&metadata)
        .bind(format_datetime(&execution.created_at))
        .bind(format_datetime(&execution.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Execution>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_execution()?))
            }
            None => Ok(None),
        }
    }

    async fn latest_for_job(&self, job_id: &Uuid) -> Result<Option<Execution>, RepositoryError> {
        let row = sqlx::query(
            "SELECT * FROM executions WHERE job_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(job_id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_execution()?))
            }
            None => Ok(None),
        }
    }

    async fn update_status(
        &self,
        id: &str,
        status: ExecutionStatus,
        exit_code: Option<i32>,
        output: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let now = format_datetime(&Utc::now());
        let completed_at = status.is_terminal().then(|| now.clone());

        let result = sqlx::query(
            r#"UPDATE executions
               SET status = ?,
                   exit_code = COALESCE(?, exit_code),
                   output = COALESCE(?, output),
                   error = COALESCE(?, error),
                   completed_at = COALESCE(?, completed_at),
                   updated_at = ?
               WHERE id = ?"#,
        )
        .bind(status.as_str())
        .bind(exit_code)
        .bind(output)
        .bind(error)
        .bind(completed_at)
        .bind(&now)
        .bind(id)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM executions WHERE id = ?")
            .bind(id)
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM executions")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(query_error)?;
        let n: i64 = row.try_get("n").map_err(query_error)?;
        Ok(n as u64)
    }

    async fn list_orphaned(&self, limit: u32) -> Result<Vec<Execution>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT e.* FROM executions e
               LEFT JOIN jobs j ON e.job_id = j.id
               WHERE j.id IS NULL
               ORDER BY e.created_at ASC
               LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                let r = ExecutionRow::from_row(row).map_err(query_error)?;
                r.into_execution()
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
