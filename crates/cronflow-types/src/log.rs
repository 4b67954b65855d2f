//! EventLog domain types and the Execution -> Log status mapping.
//!
//! An `EventLog` is the user-visible record of one event run. Each log is
//! paired (eventually) 1:1 with an execution; the pairing is a target
//! invariant, not a transient guarantee, which is why the integrity
//! subsystem exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::execution::{EXIT_PARTIAL_BASE, ExecutionStatus};

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// The user-facing record of one event run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    /// UUIDv7 log ID.
    pub id: Uuid,
    /// The event this run belongs to.
    pub event_id: Uuid,
    /// Set when the run happened as a workflow step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<Uuid>,
    /// The queued job backing this run, if one was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    /// The execution backing this run. Null only transiently (or for orphans).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    /// User-visible status.
    pub status: LogStatus,
    /// Captured output text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Total run duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Convenience flag for dashboards; true only for `success`/`partial`.
    #[serde(default)]
    pub successful: bool,
    /// Error text shown to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of retries consumed by this run.
    #[serde(default)]
    pub retry_count: u32,
    /// When the log row was created.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// User-visible status of an event run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Pending,
    Running,
    Success,
    Failure,
    Timeout,
    Partial,
}

impl LogStatus {
    /// Whether the run has reached a user-visible terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failure | Self::Timeout | Self::Partial
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
            Self::Partial => "partial",
        }
    }

    /// Derive the log status implied by an execution's authoritative state.
    ///
    /// The reconciliation mapping:
    /// - `completed` -> `success`, or `partial` when the exit code encodes a
    ///   partial multi-target result (>= 100)
    /// - `timeout` -> `timeout`
    /// - `failed` / `cancelled` -> `failure`
    /// - `running` -> `running`
    ///
    /// Non-terminal pre-run states (`queued`, `claimed`) return `None`; the
    /// log keeps whatever it currently says.
    pub fn from_execution(status: ExecutionStatus, exit_code: Option<i32>) -> Option<Self> {
        match status {
            ExecutionStatus::Completed => {
                if exit_code.is_some_and(|c| c >= EXIT_PARTIAL_BASE) {
                    Some(Self::Partial)
                } else {
                    Some(Self::Success)
                }
            }
            ExecutionStatus::Timeout => Some(Self::Timeout),
            ExecutionStatus::Failed | ExecutionStatus::Cancelled => Some(Self::Failure),
            ExecutionStatus::Running => Some(Self::Running),
            ExecutionStatus::Queued | ExecutionStatus::Claimed => None,
        }
    }

    /// The execution statuses accepted as consistent with this log status.
    ///
    /// Used by the integrity audit: a terminal log whose execution status is
    /// outside its accepted set is a status mismatch. Non-terminal and
    /// `partial` logs are not audited.
    pub fn accepted_execution_statuses(&self) -> &'static [ExecutionStatus] {
        match self {
            Self::Success => &[ExecutionStatus::Completed],
            Self::Failure => &[
                ExecutionStatus::Failed,
                ExecutionStatus::Timeout,
                ExecutionStatus::Cancelled,
            ],
            Self::Timeout => &[ExecutionStatus::Timeout],
            _ => &[],
        }
    }
}

impl std::str::FromStr for LogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "timeout" => Ok(Self::Timeout),
            "partial" => Ok(Self::Partial),
            other => Err(format!("invalid log status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
