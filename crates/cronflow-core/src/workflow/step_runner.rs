//! Step runner port: the driver's seam to the external execution agent.
//!
//! The driver never knows how a step actually runs (SSH, HTTP, local
//! process). It hands the runner a node and a resolved input payload and
//! gets back a terminal outcome. A runner error is surfaced as a node
//! failure for gating purposes; it never crashes the driver.

use cronflow_types::workflow::WorkflowNode;
use serde_json::Value;

// ---------------------------------------------------------------------------
// StepOutcome
// ---------------------------------------------------------------------------

/// Terminal outcome of one step invocation.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Whether the step succeeded.
    pub success: bool,
    /// Output payload, fed into downstream nodes' inputs.
    pub output: Option<Value>,
    /// Boolean flag the step may set through the condition-output channel;
    /// consumed by `ON_CONDITION` edges.
    pub condition: Option<bool>,
}

impl StepOutcome {
    /// A plain success with no output.
    pub fn success() -> Self {
        Self {
            success: true,
            output: None,
            condition: None,
        }
    }

    /// A plain failure with no output.
    pub fn failure() -> Self {
        Self {
            success: false,
            output: None,
            condition: None,
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_condition(mut self, condition: bool) -> Self {
        self.condition = Some(condition);
        self
    }
}

// ---------------------------------------------------------------------------
// StepRunner trait
// ---------------------------------------------------------------------------

/// Executes a single node's event and returns its terminal outcome.
///
/// Uses RPITIT (return-position `impl Trait` in traits) for async methods,
/// consistent with the project's Rust 2024 edition approach.
pub trait StepRunner: Send + Sync {
    /// Run the node's event with the given input payload.
    fn run(
        &self,
        node: &WorkflowNode,
        input: &Value,
    ) -> impl std::future::Future<Output = Result<StepOutcome, StepRunnerError>> + Send;
}

/// The runner call itself errored (transport failure, agent crash).
///
/// Treated as a failure outcome for the node it was running.
#[derive(Debug, thiserror::Error)]
#[error("step runner failure: {0}")]
pub struct StepRunnerError(pub String);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
