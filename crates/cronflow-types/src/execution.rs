//! Execution domain types and the agent exit-code convention.
//!
//! An `Execution` is one concrete attempt to run a `Job`. A job can have
//! several executions: retries, or fan-out across multiple target servers.
//! Execution IDs are text, derived from the job ID plus a millisecond
//! timestamp, which is what existing agents already write.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::JobStatus;

// ---------------------------------------------------------------------------
// Exit-code convention
// ---------------------------------------------------------------------------
//
// Preserved bit-for-bit from the agent wire protocol:
//   0        success
//   negative sentinel failures
//   >= 100   partial multi-target success, encoded as 100 + failed targets

/// Exit code reported for a fully successful execution.
pub const EXIT_SUCCESS: i32 = 0;

/// Sentinel exit code: the execution timed out.
pub const EXIT_TIMEOUT: i32 = -1;

/// Sentinel exit code: the agent could not reach the target.
pub const EXIT_CONNECTION_FAILED: i32 = -3;

/// Base for partial multi-target encoding (`100 + failed_target_count`).
pub const EXIT_PARTIAL_BASE: i32 = 100;

/// Encode a partial multi-target result as an exit code.
pub fn partial_exit_code(failed_targets: u32) -> i32 {
    EXIT_PARTIAL_BASE + failed_targets as i32
}

/// Decode the failed-target count from a partial exit code.
///
/// Returns `None` for codes below the partial base.
pub fn partial_failure_count(exit_code: i32) -> Option<u32> {
    if exit_code >= EXIT_PARTIAL_BASE {
        Some((exit_code - EXIT_PARTIAL_BASE) as u32)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// One concrete attempt to carry out a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// Text ID derived from `job_id` + creation timestamp (see [`Execution::derive_id`]).
    pub id: String,
    /// The parent job. Must reference an existing job at creation time.
    pub job_id: Uuid,
    /// Target server for this attempt, when the job ran against one server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<Uuid>,
    /// Status, sharing the job status vocabulary plus `timeout`.
    pub status: ExecutionStatus,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When the attempt finished (None while in flight).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Agent-reported exit code; see the module-level convention.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Captured standard output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Captured error text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Free-form metadata (e.g. a recovery marker when synthesized).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    /// When the execution row was created.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Execution {
    /// Derive the canonical execution ID for a job attempt.
    ///
    /// `"{job_id}-{unix_millis}"` -- matches the IDs existing agents write.
    pub fn derive_id(job_id: Uuid, created_at: DateTime<Utc>) -> String {
        format!("{job_id}-{}", created_at.timestamp_millis())
    }

    /// Whether this execution encodes a partial multi-target success.
    pub fn is_partial(&self) -> bool {
        self.exit_code.is_some_and(|c| c >= EXIT_PARTIAL_BASE)
    }
}

/// Status of a single execution attempt.
///
/// Mirrors [`JobStatus`] with the addition of `timeout`, which the agent
/// reports per attempt rather than per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Queued,
    Claimed,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl ExecutionStatus {
    /// Whether the agent has finished with this attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Timeout | Self::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Claimed => "claimed",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "claimed" => Ok(Self::Claimed),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "timeout" => Ok(Self::Timeout),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("invalid execution status: '{other}'")),
        }
    }
}

impl From<JobStatus> for ExecutionStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued => Self::Queued,
            JobStatus::Claimed => Self::Claimed,
            JobStatus::Running => Self::Running,
            JobStatus::Completed => Self::Completed,
            JobStatus::Failed => Self::Failed,
            JobStatus::Cancelled => Self::Cancelled,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
