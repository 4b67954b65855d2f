//! Workflow graph execution.
//!
//! A workflow is a DAG of event-backed nodes joined by typed, gated edges.
//! [`graph`] builds and validates the adjacency structure, [`step_runner`]
//! defines the port to the external execution agent, [`driver`] walks the
//! graph dispatching independent branches concurrently, and [`aggregator`]
//! folds per-node outcomes into the final run record.

pub mod aggregator;
pub mod driver;
pub mod graph;
pub mod step_runner;

pub use aggregator::RunAggregator;
pub use driver::{DriverError, GraphDriver, WorkflowRunResult};
pub use graph::WorkflowGraph;
pub use step_runner::{StepOutcome, StepRunner, StepRunnerError};
