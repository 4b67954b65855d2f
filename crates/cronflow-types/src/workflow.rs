//! Workflow graph domain types.
//!
//! A workflow is a DAG of event-backed nodes joined by typed connections.
//! Execution tracking lives in `WorkflowExecution` (one row per run) and
//! `WorkflowExecutionEvent` (one row per node outcome within a run).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow graph (definition)
// ---------------------------------------------------------------------------

/// A workflow definition: metadata for a DAG of nodes and connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// UUIDv7 workflow ID.
    pub id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    /// The user who owns this workflow.
    pub user_id: Uuid,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the workflow can currently be triggered.
    #[serde(default = "default_true")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

/// A node in the workflow DAG: wraps an event plus canvas layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// UUIDv7 node ID.
    pub id: Uuid,
    /// Owning workflow.
    pub workflow_id: Uuid,
    /// The event this node runs.
    pub event_id: Uuid,
    /// Canvas layout position.
    pub position: NodePosition,
}

/// Canvas position coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
}

/// A directed, typed edge between two workflow nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConnection {
    /// UUIDv7 connection ID.
    pub id: Uuid,
    /// Owning workflow.
    pub workflow_id: Uuid,
    pub source_node_id: Uuid,
    pub target_node_id: Uuid,
    /// Gate deciding whether this edge fires for a given upstream outcome.
    pub connection_type: ConnectionType,
}

/// Edge gate type.
///
/// A closed enum with one evaluation rule per variant -- see
/// [`ConnectionType::is_satisfied_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionType {
    Always,
    OnSuccess,
    OnFailure,
    OnCondition,
}

impl ConnectionType {
    /// Evaluate this edge for a completed predecessor.
    ///
    /// `success` is the predecessor's terminal outcome; `condition` is the
    /// boolean flag the step may have set through the runner's
    /// condition-output channel.
    pub fn is_satisfied_by(&self, success: bool, condition: Option<bool>) -> bool {
        match self {
            Self::Always => true,
            Self::OnSuccess => success,
            Self::OnFailure => !success,
            Self::OnCondition => condition == Some(true),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "ALWAYS",
            Self::OnSuccess => "ON_SUCCESS",
            Self::OnFailure => "ON_FAILURE",
            Self::OnCondition => "ON_CONDITION",
        }
    }
}

impl std::str::FromStr for ConnectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALWAYS" => Ok(Self::Always),
            "ON_SUCCESS" => Ok(Self::OnSuccess),
            "ON_FAILURE" => Ok(Self::OnFailure),
            "ON_CONDITION" => Ok(Self::OnCondition),
            other => Err(format!("invalid connection type: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow execution tracking
// ---------------------------------------------------------------------------

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowExecutionStatus {
    Pending,
    Running,
    Success,
    Failure,
}

impl WorkflowExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl std::str::FromStr for WorkflowExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(format!("invalid workflow execution status: '{other}'")),
        }
    }
}

/// One run of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// UUIDv7 run ID.
    pub id: Uuid,
    /// The workflow being executed.
    pub workflow_id: Uuid,
    pub status: WorkflowExecutionStatus,
    /// How this run was triggered (e.g. "manual", "schedule", "webhook").
    pub trigger_type: String,
    /// The user who triggered the run, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// `completed_at - started_at`, set at finalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<i64>,
    /// Nodes dispatched during this run.
    #[serde(default)]
    pub total_events: u32,
    #[serde(default)]
    pub successful_events: u32,
    #[serde(default)]
    pub failed_events: u32,
    /// Arbitrary execution payload (accumulated step outputs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_data: Option<serde_json::Value>,
}

/// Status of one node outcome within a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeEventStatus {
    Pending,
    Running,
    Success,
    Failure,
    Skipped,
}

impl NodeEventStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Skipped => "skipped",
        }
    }
}

impl std::str::FromStr for NodeEventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("invalid node event status: '{other}'")),
        }
    }
}

/// One node's outcome within a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionEvent {
    /// UUIDv7 event ID.
    pub id: Uuid,
    /// Parent workflow run.
    pub workflow_execution_id: Uuid,
    /// The node this outcome belongs to.
    pub node_id: Uuid,
    /// The event the node ran (denormalized for display).
    pub event_id: Uuid,
    /// Monotonic dispatch order within the run (wall-clock start order).
    pub sequence_order: u32,
    pub status: NodeEventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// JSON output produced by the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The connection type that fired this node (None for root nodes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by_connection: Option<ConnectionType>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
