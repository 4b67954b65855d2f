//! Job domain types.
//!
//! A `Job` is a queued unit of work created when an event fires. The external
//! execution agent claims it, runs it, and reports progress by mutating its
//! status. Jobs are never deleted directly -- only via the owning event's
//! cascade, which is what makes orphaned child rows possible in the first
//! place (see `cronflow-core::integrity`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A queued unit of work awaiting execution by an external agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// UUIDv7 job ID.
    pub id: Uuid,
    /// The event this job was created for.
    pub event_id: Uuid,
    /// The user who owns the event.
    pub user_id: Uuid,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Dispatch priority (higher runs first).
    #[serde(default)]
    pub priority: i32,
    /// What the agent should actually do, keyed by job kind.
    pub payload: JobPayload,
    /// When the job should run.
    pub scheduled_for: DateTime<Utc>,
    /// Identifier of the agent that claimed this job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Number of execution attempts so far.
    #[serde(default)]
    pub attempts: u32,
    /// Error message from the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    /// When the job row was created.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Claimed,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether this status is terminal (the agent will not touch the job again).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// String form used in SQL columns and wire payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Claimed => "claimed",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "claimed" => Ok(Self::Claimed),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("invalid job status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Job payload (tagged by kind)
// ---------------------------------------------------------------------------

/// What a job actually does, keyed by job kind.
///
/// Internally tagged by `kind` so existing agent payloads deserialize
/// directly:
/// ```json
/// { "kind": "script", "interpreter": "bash", "source": "echo hi" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Run a script through an interpreter on the target server(s).
    Script {
        interpreter: String,
        source: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        environment: HashMap<String, String>,
        /// Target server IDs; empty means run locally on the agent.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        server_ids: Vec<Uuid>,
    },
    /// Make an HTTP request.
    Http {
        method: String,
        url: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },
    /// Invoke a named tool action with parameters.
    ToolAction {
        tool: String,
        action: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<serde_json::Value>,
    },
}

impl JobPayload {
    /// The job kind discriminant as stored in the `kind` column.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Script { .. } => "script",
            Self::Http { .. } => "http",
            Self::ToolAction { .. } => "tool_action",
        }
    }

    /// Number of distinct execution targets this payload fans out to.
    ///
    /// Script jobs run once per target server (minimum 1, the local agent).
    /// Other kinds always have a single target.
    pub fn target_count(&self) -> usize {
        match self {
            Self::Script { server_ids, .. } => server_ids.len().max(1),
            _ => 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_status_round_trip() {
        for s in [
            JobStatus::Queued,
            JobStatus::Claimed,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            let parsed: JobStatus = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
        assert!("bogus".parse::<JobStatus>().is_err());
    }

    #[test]
    fn job_status_terminality() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn payload_tagged_by_kind() {
        let payload: JobPayload = serde_json::from_value(json!({
            "kind": "script",
            "interpreter": "bash",
            "source": "echo hi"
        }))
        .unwrap();
        assert_eq!(payload.kind(), "script");
        assert_eq!(payload.target_count(), 1);

        let payload: JobPayload = serde_json::from_value(json!({
            "kind": "http",
            "method": "POST",
            "url": "https://example.com/hook"
        }))
        .unwrap();
        assert_eq!(payload.kind(), "http");
    }

    #[test]
    fn script_target_count_fans_out() {
        let payload = JobPayload::Script {
            interpreter: "bash".to_string(),
            source: "uptime".to_string(),
            environment: HashMap::new(),
            server_ids: vec![Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7()],
        };
        assert_eq!(payload.target_count(), 3);
    }
}
