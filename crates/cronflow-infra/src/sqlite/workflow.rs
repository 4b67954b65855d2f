//! SQLite workflow repository implementation.
//!
//! Graph writes (workflow + nodes + connections) and deletes are
//! transactional: a workflow is never visible half-assembled.

use chrono::Utc;
use cronflow_core::repository::WorkflowRepository;
use cronflow_types::error::RepositoryError;
use cronflow_types::workflow::{
    ConnectionType, NodeEventStatus, NodePosition, Workflow, WorkflowConnection,
    WorkflowExecution, WorkflowExecutionEvent, WorkflowExecutionStatus, WorkflowNode,
};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed implementation of `WorkflowRepository`.
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Row conversions
// ---------------------------------------------------------------------------

fn workflow_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Workflow, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_error)?;
    let user_id: String = row.try_get("user_id").map_err(query_error)?;
    let created_at: String = row.try_get("created_at").map_err(query_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(query_error)?;

    Ok(Workflow {
        id: parse_uuid(&id)?,
        name: row.try_get("name").map_err(query_error)?,
        user_id: parse_uuid(&user_id)?,
        description: row.try_get("description").map_err(query_error)?,
        active: row.try_get("active").map_err(query_error)?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

fn node_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowNode, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_error)?;
    let workflow_id: String = row.try_get("workflow_id").map_err(query_error)?;
    let event_id: String = row.try_get("event_id").map_err(query_error)?;

    Ok(WorkflowNode {
        id: parse_uuid(&id)?,
        workflow_id: parse_uuid(&workflow_id)?,
        event_id: parse_uuid(&event_id)?,
        position: NodePosition {
            x: row.try_get("position_x").map_err(query_error)?,
            y: row.try_get("position_y").map_err(query_error)?,
        },
    })
}

fn connection_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowConnection, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_error)?;
    let workflow_id: String = row.try_get("workflow_id").map_err(query_error)?;
    let source: String = row.try_get("source_node_id").map_err(query_error)?;
    let target: String = row.try_get("target_node_id").map_err(query_error)?;
    let kind: String = row.try_get("connection_type").map_err(query_error)?;

    Ok(WorkflowConnection {
        id: parse_uuid(&id)?,
        workflow_id: parse_uuid(&workflow_id)?,
        source_node_id: parse_uuid(&source)?,
        target_node_id: parse_uuid(&target)?,
        connection_type: kind.parse().map_err(RepositoryError::Query)?,
    })
}

fn execution_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowExecution, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_error)?;
    let workflow_id: String = row.try_get("workflow_id").map_err(query_error)?;
    let status: String = row.try_get("status").map_err(query_error)?;
    let triggered_by: Option<String> = row.try_get("triggered_by").map_err(query_error)?;
    let started_at: String = row.try_get("started_at").map_err(query_error)?;
    let completed_at: Option<String> = row.try_get("completed_at").map_err(query_error)?;
    let total_events: i64 = row.try_get("total_events").map_err(query_error)?;
    let successful_events: i64 = row.try_get("successful_events").map_err(query_error)?;
    let failed_events: i64 = row.try_get("failed_events").map_err(query_error)?;
    let execution_data: Option<String> = row.try_get("execution_data").map_err(query_error)?;

    let execution_data = execution_data
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| RepositoryError::Query(format!("invalid execution_data JSON: {e}")))?;

    Ok(WorkflowExecution {
        id: parse_uuid(&id)?,
        workflow_id: parse_uuid(&workflow_id)?,
        status: status
            .parse::<WorkflowExecutionStatus>()
            .map_err(RepositoryError::Query)?,
        trigger_type: row.try_get("trigger_type").map_err(query_error)?,
        triggered_by: triggered_by.as_deref().map(parse_uuid).transpose()?,
        started_at: parse_datetime(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_datetime).transpose()?,
        total_duration_ms: row.try_get("total_duration_ms").map_err(query_error)?,
        total_events: total_events as u32,
        successful_events: successful_events as u32,
        failed_events: failed_events as u32,
        execution_data,
    })
}

fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowExecutionEvent, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_error)?;
    let run_id: String = row.try_get("workflow_execution_id").map_err(query_error)?;
    let node_id: String = row.try_get("node_id").map_err(query_error)?;
    let event_id: String = row.try_get("event_id").map_err(query_error)?;
    let sequence_order: i64 = row.try_get("sequence_order").map_err(query_error)?;
    let status: String = row.try_get("status").map_err(query_error)?;
    let started_at: Option<String> = row.try_get("started_at").map_err(query_error)?;
    let completed_at: Option<String> = row.try_get("completed_at").map_err(query_error)?;
    let output: Option<String> = row.try_get("output").map_err(query_error)?;
    let triggered: Option<String> = row.try_get("triggered_by_connection").map_err(query_error)?;

    let output = output
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| RepositoryError::Query(format!("invalid event output JSON: {e}")))?;

    Ok(WorkflowExecutionEvent {
        id: parse_uuid(&id)?,
        workflow_execution_id: parse_uuid(&run_id)?,
        node_id: parse_uuid(&node_id)?,
        event_id: parse_uuid(&event_id)?,
        sequence_order: sequence_order as u32,
        status: status
            .parse::<NodeEventStatus>()
            .map_err(RepositoryError::Query)?,
        started_at: started_at.as_deref().map(parse_datetime).transpose()?,
        completed_at: completed_at.as_deref().map(parse_datetime).transpose()?,
        duration_ms: row.try_get("duration_ms").map_err(query_error)?,
        output,
        error: row.try_get("error").map_err(query_error)?,
        triggered_by_connection: triggered
            .as_deref()
            .map(|s| s.parse::<ConnectionType>())
            .transpose()
            .map_err(RepositoryError::Query)?,
    })
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn create_workflow(
        &self,
        workflow: &Workflow,
        nodes: &[WorkflowNode],
        connections: &[WorkflowConnection],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        sqlx::query(
            r#"INSERT INTO workflows (id, name, user_id, description, active, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.name)
        .bind(workflow.user_id.to_string())
        .bind(&workflow.description)
        .bind(workflow.active)
        .bind(format_datetime(&workflow.created_at))
        .bind(format_datetime(&workflow.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        for node in nodes {
            sqlx::query(
                r#"INSERT INTO workflow_nodes (id, workflow_id, event_id, position_x, position_y)
                   VALUES (?, ?, ?, ?, ?)"#,
            )
            .bind(node.id.to_string())
            .bind(node.workflow_id.to_string())
            .bind(node.event_id.to_string())
            .bind(node.position.x)
            .bind(node.position.y)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        }

        for conn in connections {
            sqlx::query(
                r#"INSERT INTO workflow_connections
                   (id, workflow_id, source_node_id, target_node_id, connection_type)
                   VALUES (?, ?, ?, ?, ?)"#,
            )
            .bind(conn.id.to_string())
            .bind(conn.workflow_id.to_string())
            .bind(conn.source_node_id.to_string())
            .bind(conn.target_node_id.to_string())
            .bind(conn.connection_type.as_str())
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        }

        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.as_ref().map(workflow_from_row).transpose()
    }

    async fn list_nodes(&self, workflow_id: &Uuid) -> Result<Vec<WorkflowNode>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM workflow_nodes WHERE workflow_id = ? ORDER BY id")
            .bind(workflow_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        rows.iter().map(node_from_row).collect()
    }

    async fn list_connections(
        &self,
        workflow_id: &Uuid,
    ) -> Result<Vec<WorkflowConnection>, RepositoryError> {
        let rows =
            sqlx::query("SELECT * FROM workflow_connections WHERE workflow_id = ? ORDER BY id")
                .bind(workflow_id.to_string())
                .fetch_all(&self.pool.reader)
                .await
                .map_err(query_error)?;

        rows.iter().map(connection_from_row).collect()
    }

    async fn delete_workflow(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        // Explicit child deletes; the schema cascade is a backstop.
        sqlx::query("DELETE FROM workflow_connections WHERE workflow_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        sqlx::query("DELETE FROM workflow_nodes WHERE workflow_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        let execution_data = execution
            .execution_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("serialize execution_data: {e}")))?;

        sqlx::query(
            r#"INSERT INTO workflow_executions
               (id, workflow_id, status, trigger_type, triggered_by, started_at,
                completed_at, total_duration_ms, total_events, successful_events,
                failed_events, execution_data)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(execution.status.as_str())
        .bind(&execution.trigger_type)
        .bind(execution.triggered_by.map(|t| t.to_string()))
        .bind(format_datetime(&execution.started_at))
        .bind(execution.completed_at.as_ref().map(format_datetime))
        .bind(execution.total_duration_ms)
        .bind(execution.total_events as i64)
        .bind(execution.successful_events as i64)
        .bind(execution.failed_events as i64)
        .bind(execution_data)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        let execution_data = execution
            .execution_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("serialize execution_data: {e}")))?;

        let result = sqlx::query(
            r#"UPDATE workflow_executions
               SET status = ?, completed_at = ?, total_duration_ms = ?,
                   total_events = ?, successful_events = ?, failed_events = ?,
                   execution_data = ?
               WHERE id = ?"#,
        )
        .bind(execution.status.as_str())
        .bind(execution.completed_at.as_ref().map(format_datetime))
        .bind(execution.total_duration_ms)
        .bind(execution.total_events as i64)
        .bind(execution.successful_events as i64)
        .bind(execution.failed_events as i64)
        .bind(execution_data)
        .bind(execution.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.as_ref().map(execution_from_row).transpose()
    }

    async fn list_executions(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM workflow_executions
               WHERE workflow_id = ?
               ORDER BY started_at DESC
               LIMIT ?"#,
        )
        .bind(workflow_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter().map(execution_from_row).collect()
    }

    async fn create_event(&self, event: &WorkflowExecutionEvent) -> Result<(), RepositoryError> {
        let output = event
            .output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("serialize event output: {e}")))?;

        sqlx::query(
            r#"INSERT INTO workflow_execution_events
               (id, workflow_execution_id, node_id, event_id, sequence_order,
                status, started_at, completed_at, duration_ms, output, error,
                triggered_by_connection)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(event.id.to_string())
        .bind(event.workflow_execution_id.to_string())
        .bind(event.node_id.to_string())
        .bind(event.event_id.to_string())
        .bind(event.sequence_order as i64)
        .bind(event.status.as_str())
        .bind(event.started_at.as_ref().map(format_datetime))
        .bind(event.completed_at.as_ref().map(format_datetime))
        .bind(event.duration_ms)
        .bind(output)
        .bind(&event.error)
        .bind(event.triggered_by_connection.map(|c| c.as_str()))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn update_event(
        &self,
        event_id: &Uuid,
        status: NodeEventStatus,
        output: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let output = output
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("serialize event output: {e}")))?;

        // Completion timestamp and duration are derived from the stored
        // started_at when the status is terminal.
        let completed_at = status.is_terminal().then(|| format_datetime(&Utc::now()));

        let result = sqlx::query(
            r#"UPDATE workflow_execution_events
               SET status = ?,
                   output = COALESCE(?, output),
                   error = COALESCE(?, error),
                   completed_at = COALESCE(?, completed_at),
                   duration_ms = CASE
                       WHEN ? IS NOT NULL AND started_at IS NOT NULL
                       THEN CAST((julianday(?) - julianday(started_at)) * 86400000 AS INTEGER)
                       ELSE duration_ms
                   END
               WHERE id = ?"#,
        )
        .bind(status.as_str())
        .bind(output)
        .bind(error)
        .bind(&completed_at)
        .bind(&completed_at)
        .bind(&completed_at)
        .bind(event_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_events(
        &self,
        workflow_execution_id: &Uuid,
    ) -> Result<Vec<WorkflowExecutionEvent>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM workflow_execution_events
               WHERE workflow_execution_id = ?
               ORDER BY sequence_order ASC"#,
        )
        .bind(workflow_execution_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter().map(event_from_row).collect()
    }

    async fn list_stuck_executions(&self) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM workflow_executions
               WHERE status NOT IN ('success', 'failure')
               ORDER BY started_at ASC"#,
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter().map(execution_from_row).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
