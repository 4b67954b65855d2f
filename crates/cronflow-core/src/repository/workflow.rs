//! Workflow repository trait definition.
//!
//! Covers three entity families:
//! - **Graphs:** workflow metadata plus its nodes and connections.
//! - **Executions:** one row per workflow run.
//! - **Events:** one row per node outcome within a run.

use cronflow_types::error::RepositoryError;
use cronflow_types::workflow::{
    NodeEventStatus, Workflow, WorkflowConnection, WorkflowExecution, WorkflowExecutionEvent,
    WorkflowNode,
};
use uuid::Uuid;

/// Repository trait for workflow persistence.
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Graphs
    // -----------------------------------------------------------------------

    /// Insert a workflow together with its nodes and connections in one
    /// transaction.
    fn create_workflow(
        &self,
        workflow: &Workflow,
        nodes: &[WorkflowNode],
        connections: &[WorkflowConnection],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get workflow metadata by ID.
    fn get_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// All nodes of a workflow.
    fn list_nodes(
        &self,
        workflow_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowNode>, RepositoryError>> + Send;

    /// All connections of a workflow.
    fn list_connections(
        &self,
        workflow_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowConnection>, RepositoryError>> + Send;

    /// Delete a workflow and cascade its nodes and connections in one
    /// transaction. Returns `true` if it existed.
    fn delete_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Executions (runs)
    // -----------------------------------------------------------------------

    /// Create a new workflow execution record.
    fn create_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Rewrite a run's status, counters, and (on terminal states) completion
    /// timestamp, total duration, and execution data.
    fn update_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a workflow execution by ID.
    fn get_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowExecution>, RepositoryError>> + Send;

    /// List runs for a workflow, ordered by started_at DESC.
    fn list_executions(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowExecution>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Events (per-node outcomes)
    // -----------------------------------------------------------------------

    /// Create a new node outcome row.
    fn create_event(
        &self,
        event: &WorkflowExecutionEvent,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Update a node outcome's status and completion fields.
    fn update_event(
        &self,
        event_id: &Uuid,
        status: NodeEventStatus,
        output: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All node outcomes of a run, ordered by sequence.
    fn list_events(
        &self,
        workflow_execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowExecutionEvent>, RepositoryError>> + Send;

    /// Runs left in a non-terminal status (crash reporting).
    fn list_stuck_executions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowExecution>, RepositoryError>> + Send;
}
