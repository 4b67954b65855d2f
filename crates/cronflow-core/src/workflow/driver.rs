//! Graph driver: edge-gated concurrent DAG traversal.
//!
//! The driver loads a workflow's nodes and connections, validates the graph,
//! and dispatches runnable nodes as concurrent tasks via `tokio::JoinSet`.
//! Edge gates are evaluated in the single `join_next()` collection loop, so
//! the per-node resolution counters have exactly one serializing point and a
//! join node can never double-dispatch.
//!
//! # Traversal
//!
//! 1. Root nodes (zero in-degree) dispatch immediately with the trigger
//!    payload as input.
//! 2. When a node completes, every outgoing edge is evaluated against its
//!    outcome. A target becomes runnable once all distinct predecessors have
//!    resolved and at least one inbound edge was satisfied.
//! 3. A target whose predecessors all resolved without any satisfied edge is
//!    marked `skipped`, and its own outgoing edges resolve unsatisfied --
//!    skips propagate, so a join blocked behind a skipped branch can never
//!    wait forever.
//! 4. Every dispatch, completion, and skip writes a `WorkflowExecutionEvent`
//!    row; the run record is finalized by the [`RunAggregator`].
//!
//! Cancellation is cooperative: in-flight steps drain, no new node is
//! dispatched, and the run terminates as failure.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use cronflow_types::error::{GraphError, RepositoryError};
use cronflow_types::workflow::{
    ConnectionType, NodeEventStatus, WorkflowExecution, WorkflowExecutionEvent,
    WorkflowExecutionStatus, WorkflowNode,
};
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::repository::WorkflowRepository;

use super::aggregator::RunAggregator;
use super::graph::WorkflowGraph;
use super::step_runner::{StepOutcome, StepRunner};

// ---------------------------------------------------------------------------
// WorkflowRunResult
// ---------------------------------------------------------------------------

/// Structured result of one workflow run.
///
/// A failed run is still a result, never a bare error: callers always get
/// the run ID and whatever output the succeeded nodes produced.
#[derive(Debug, Clone)]
pub struct WorkflowRunResult {
    /// Whether the run finished with status `success`.
    pub success: bool,
    /// ID of the `WorkflowExecution` record.
    pub execution_id: Uuid,
    /// Merged outputs of all succeeded nodes.
    pub output: Value,
}

// ---------------------------------------------------------------------------
// GraphDriver
// ---------------------------------------------------------------------------

/// Concurrent workflow executor, generic over storage and the step runner.
pub struct GraphDriver<R, S> {
    repo: Arc<R>,
    runner: Arc<S>,
    /// Cancellation tokens keyed by workflow execution ID.
    cancellation_tokens: DashMap<Uuid, CancellationToken>,
}

/// Per-node bookkeeping during one traversal.
///
/// Only mutated from the collection loop, never from spawned tasks.
struct NodeState {
    /// Distinct-source in-degree.
    required: usize,
    /// Predecessors that reached a terminal state.
    resolved: usize,
    /// Inbound edges whose gate fired.
    satisfied: usize,
    /// Merged input payload from satisfied predecessors.
    input: Map<String, Value>,
    /// Gate of the first edge that fired this node.
    fired_by: Option<ConnectionType>,
    /// Node has been dispatched or skipped; resolution is finished.
    settled: bool,
}

/// What a spawned node task reports back.
struct NodeCompletion {
    node_id: Uuid,
    success: bool,
    output: Option<Value>,
    condition: Option<bool>,
}

/// Traversal output handed back to `execute_workflow` for finalization.
struct TraversalOutcome {
    aggregator: RunAggregator,
    output: Map<String, Value>,
    cancelled: bool,
}

impl<R, S> GraphDriver<R, S>
where
    R: WorkflowRepository + 'static,
    S: StepRunner + 'static,
{
    pub fn new(repo: R, runner: S) -> Self {
        Self {
            repo: Arc::new(repo),
            runner: Arc::new(runner),
            cancellation_tokens: DashMap::new(),
        }
    }

    /// Execute a workflow from its trigger.
    ///
    /// Graph-structural errors (cycle, dangling edge, empty graph) fail
    /// before any run record is created. Once traversal starts, node
    /// failures are outcomes, not errors.
    pub async fn execute_workflow(
        &self,
        workflow_id: Uuid,
        trigger_type: &str,
        triggered_by: Option<Uuid>,
        initial_payload: Option<Value>,
    ) -> Result<WorkflowRunResult, DriverError> {
        let workflow = self
            .repo
            .get_workflow(&workflow_id)
            .await?
            .ok_or(DriverError::WorkflowNotFound(workflow_id))?;
        let nodes = self.repo.list_nodes(&workflow_id).await?;
        let connections = self.repo.list_connections(&workflow_id).await?;
        let graph = WorkflowGraph::new(nodes, connections)?;

        let started_at = Utc::now();
        let execution_id = Uuid::now_v7();
        let mut execution = WorkflowExecution {
            id: execution_id,
            workflow_id,
            status: WorkflowExecutionStatus::Running,
            trigger_type: trigger_type.to_string(),
            triggered_by,
            started_at,
            completed_at: None,
            total_duration_ms: None,
            total_events: 0,
            successful_events: 0,
            failed_events: 0,
            execution_data: None,
        };
        self.repo.create_execution(&execution).await?;

        let cancel_token = CancellationToken::new();
        self.cancellation_tokens
            .insert(execution_id, cancel_token.clone());

        tracing::info!(
            execution_id = %execution_id,
            workflow = workflow.name.as_str(),
            trigger_type,
            nodes = graph.len(),
            "starting workflow run"
        );

        let traversal = self
            .traverse(&graph, execution_id, initial_payload, &cancel_token)
            .await;
        self.cancellation_tokens.remove(&execution_id);

        match traversal {
            Ok(outcome) => {
                outcome.aggregator.finalize(&mut execution, outcome.cancelled);
                execution.execution_data = Some(Value::Object(outcome.output.clone()));
                self.repo.update_execution(&execution).await?;

                let success = execution.status == WorkflowExecutionStatus::Success;
                tracing::info!(
                    execution_id = %execution_id,
                    status = execution.status.as_str(),
                    total = execution.total_events,
                    failed = execution.failed_events,
                    duration_ms = execution.total_duration_ms,
                    "workflow run finished"
                );

                Ok(WorkflowRunResult {
                    success,
                    execution_id,
                    output: Value::Object(outcome.output),
                })
            }
            Err(e) => {
                // Storage broke mid-run. Best-effort terminal record so the
                // run is never left looking alive.
                execution.status = WorkflowExecutionStatus::Failure;
                let completed_at = Utc::now();
                execution.completed_at = Some(completed_at);
                execution.total_duration_ms =
                    Some((completed_at - started_at).num_milliseconds());
                let _ = self.repo.update_execution(&execution).await;

                tracing::error!(execution_id = %execution_id, error = %e, "workflow run aborted");
                Err(e)
            }
        }
    }

    /// Request cancellation of a running workflow execution.
    ///
    /// In-flight steps finish; no new node dispatches after the token flips.
    pub fn cancel(&self, execution_id: Uuid) -> Result<(), DriverError> {
        match self.cancellation_tokens.remove(&execution_id) {
            Some((_, token)) => {
                token.cancel();
                tracing::info!(execution_id = %execution_id, "workflow run cancellation requested");
                Ok(())
            }
            None => Err(DriverError::RunNotFound(execution_id)),
        }
    }

    /// Walk the graph to completion, returning the aggregate outcome.
    async fn traverse(
        &self,
        graph: &WorkflowGraph,
        execution_id: Uuid,
        initial_payload: Option<Value>,
        cancel_token: &CancellationToken,
    ) -> Result<TraversalOutcome, DriverError> {
        let aggregator = RunAggregator::new(Utc::now());
        let mut states: HashMap<Uuid, NodeState> = graph
            .node_ids()
            .map(|id| {
                (
                    *id,
                    NodeState {
                        required: graph.in_degree(id),
                        resolved: 0,
                        satisfied: 0,
                        input: Map::new(),
                        fired_by: None,
                        settled: false,
                    },
                )
            })
            .collect();

        let mut join_set: JoinSet<Result<NodeCompletion, DriverError>> = JoinSet::new();
        let mut sequence: u32 = 0;
        let mut run_output: Map<String, Value> = Map::new();

        // Roots take the trigger payload as input.
        let roots: Vec<WorkflowNode> = graph.roots().into_iter().cloned().collect();
        for root in roots {
            let state = states
                .get_mut(&root.id)
                .ok_or(DriverError::CorruptState(root.id))?;
            merge_payload(&mut state.input, initial_payload.clone(), "trigger");
            state.settled = true;
            let input = Value::Object(state.input.clone());

            sequence += 1;
            aggregator.record_dispatch();
            self.spawn_node(&mut join_set, execution_id, root, input, sequence, None);
        }

        // Single serializing point for gate evaluation and dispatch.
        while let Some(joined) = join_set.join_next().await {
            let completion = joined.map_err(|e| DriverError::Join(e.to_string()))??;
            aggregator.record_outcome(completion.success);
            if completion.success {
                merge_payload(
                    &mut run_output,
                    completion.output.clone(),
                    &completion.node_id.to_string(),
                );
            }

            let cancelled = cancel_token.is_cancelled();
            let mut skip_queue: VecDeque<Uuid> = VecDeque::new();

            for (target_id, satisfied_gate) in
                resolve_outgoing(graph, &completion, &mut states)?
            {
                let state = states
                    .get_mut(&target_id)
                    .ok_or(DriverError::CorruptState(target_id))?;
                if state.fired_by.is_none() {
                    state.fired_by = satisfied_gate;
                }
                if state.resolved < state.required || state.settled {
                    continue;
                }
                if state.satisfied > 0 && !cancelled {
                    state.settled = true;
                    let node = graph
                        .node(&target_id)
                        .ok_or(DriverError::CorruptState(target_id))?
                        .clone();
                    let input = Value::Object(state.input.clone());
                    let fired_by = state.fired_by;

                    sequence += 1;
                    aggregator.record_dispatch();
                    self.spawn_node(&mut join_set, execution_id, node, input, sequence, fired_by);
                } else {
                    skip_queue.push_back(target_id);
                }
            }

            // Skips propagate: a skipped node resolves all of its outgoing
            // edges as unsatisfied, which may skip (or release) nodes
            // further down.
            while let Some(skipped_id) = skip_queue.pop_front() {
                let state = states
                    .get_mut(&skipped_id)
                    .ok_or(DriverError::CorruptState(skipped_id))?;
                if state.settled {
                    continue;
                }
                state.settled = true;

                let node = graph
                    .node(&skipped_id)
                    .ok_or(DriverError::CorruptState(skipped_id))?;
                sequence += 1;
                self.persist_skipped(execution_id, node, sequence).await?;

                let skipped_completion = NodeCompletion {
                    node_id: skipped_id,
                    success: false,
                    output: None,
                    condition: None,
                };
                for (target_id, _) in
                    resolve_outgoing_unsatisfied(graph, &skipped_completion, &mut states)?
                {
                    let state = states
                        .get_mut(&target_id)
                        .ok_or(DriverError::CorruptState(target_id))?;
                    if state.resolved < state.required || state.settled {
                        continue;
                    }
                    if state.satisfied > 0 && !cancelled {
                        state.settled = true;
                        let node = graph
                            .node(&target_id)
                            .ok_or(DriverError::CorruptState(target_id))?
                            .clone();
                        let input = Value::Object(state.input.clone());
                        let fired_by = state.fired_by;

                        sequence += 1;
                        aggregator.record_dispatch();
                        self.spawn_node(
                            &mut join_set,
                            execution_id,
                            node,
                            input,
                            sequence,
                            fired_by,
                        );
                    } else {
                        skip_queue.push_back(target_id);
                    }
                }
            }
        }

        Ok(TraversalOutcome {
            aggregator,
            output: run_output,
            cancelled: cancel_token.is_cancelled(),
        })
    }

    /// Spawn one node task: persist the running event row, invoke the step
    /// runner, persist the terminal row. A runner error becomes a failure
    /// outcome, never a driver error.
    fn spawn_node(
        &self,
        join_set: &mut JoinSet<Result<NodeCompletion, DriverError>>,
        execution_id: Uuid,
        node: WorkflowNode,
        input: Value,
        sequence_order: u32,
        triggered_by: Option<ConnectionType>,
    ) {
        let repo = Arc::clone(&self.repo);
        let runner = Arc::clone(&self.runner);

        join_set.spawn(async move {
            let event_row = WorkflowExecutionEvent {
                id: Uuid::now_v7(),
                workflow_execution_id: execution_id,
                node_id: node.id,
                event_id: node.event_id,
                sequence_order,
                status: NodeEventStatus::Running,
                started_at: Some(Utc::now()),
                completed_at: None,
                duration_ms: None,
                output: None,
                error: None,
                triggered_by_connection: triggered_by,
            };
            repo.create_event(&event_row).await?;

            tracing::debug!(
                node_id = %node.id,
                event_id = %node.event_id,
                sequence_order,
                "dispatching node"
            );

            let (outcome, error) = match runner.run(&node, &input).await {
                Ok(outcome) => (outcome, None),
                Err(e) => {
                    tracing::warn!(node_id = %node.id, error = %e, "step runner failed");
                    (StepOutcome::failure(), Some(e.to_string()))
                }
            };

            let status = if outcome.success {
                NodeEventStatus::Success
            } else {
                NodeEventStatus::Failure
            };
            repo.update_event(&event_row.id, status, outcome.output.as_ref(), error.as_deref())
                .await?;

            Ok(NodeCompletion {
                node_id: node.id,
                success: outcome.success,
                output: outcome.output,
                condition: outcome.condition,
            })
        });
    }

    /// Persist the event row for a node that was never invoked.
    async fn persist_skipped(
        &self,
        execution_id: Uuid,
        node: &WorkflowNode,
        sequence_order: u32,
    ) -> Result<(), DriverError> {
        let event_row = WorkflowExecutionEvent {
            id: Uuid::now_v7(),
            workflow_execution_id: execution_id,
            node_id: node.id,
            event_id: node.event_id,
            sequence_order,
            status: NodeEventStatus::Skipped,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            output: None,
            error: None,
            triggered_by_connection: None,
        };
        self.repo.create_event(&event_row).await?;
        tracing::debug!(node_id = %node.id, "node skipped");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Edge resolution
// ---------------------------------------------------------------------------

/// Resolve a completed node's outgoing edges, grouped per distinct target.
///
/// Returns each affected target together with the gate of the satisfied edge
/// (if any). Outputs of satisfied `ALWAYS`/`ON_SUCCESS` edges merge into the
/// target's input.
fn resolve_outgoing(
    graph: &WorkflowGraph,
    completion: &NodeCompletion,
    states: &mut HashMap<Uuid, NodeState>,
) -> Result<Vec<(Uuid, Option<ConnectionType>)>, DriverError> {
    let mut per_target: Vec<(Uuid, Option<ConnectionType>)> = Vec::new();

    for conn in graph.outgoing(&completion.node_id) {
        let satisfied = conn
            .connection_type
            .is_satisfied_by(completion.success, completion.condition);

        let (slot_idx, first_for_target) = match per_target
            .iter()
            .position(|(target, _)| *target == conn.target_node_id)
        {
            Some(idx) => (idx, false),
            None => {
                per_target.push((conn.target_node_id, None));
                (per_target.len() - 1, true)
            }
        };

        let state = states
            .get_mut(&conn.target_node_id)
            .ok_or(DriverError::CorruptState(conn.target_node_id))?;
        // Distinct-source resolution: parallel edges count once.
        if first_for_target {
            state.resolved += 1;
        }
        if satisfied {
            state.satisfied += 1;
            if per_target[slot_idx].1.is_none() {
                per_target[slot_idx].1 = Some(conn.connection_type);
            }
            if matches!(
                conn.connection_type,
                ConnectionType::Always | ConnectionType::OnSuccess
            ) {
                merge_payload(
                    &mut state.input,
                    completion.output.clone(),
                    &completion.node_id.to_string(),
                );
            }
        }
    }

    Ok(per_target)
}

/// Resolve a skipped node's outgoing edges: every one is unsatisfied.
fn resolve_outgoing_unsatisfied(
    graph: &WorkflowGraph,
    completion: &NodeCompletion,
    states: &mut HashMap<Uuid, NodeState>,
) -> Result<Vec<(Uuid, Option<ConnectionType>)>, DriverError> {
    let mut per_target: Vec<(Uuid, Option<ConnectionType>)> = Vec::new();
    for conn in graph.outgoing(&completion.node_id) {
        if per_target.iter().any(|(t, _)| *t == conn.target_node_id) {
            continue;
        }
        let state = states
            .get_mut(&conn.target_node_id)
            .ok_or(DriverError::CorruptState(conn.target_node_id))?;
        state.resolved += 1;
        per_target.push((conn.target_node_id, None));
    }
    Ok(per_target)
}

/// Merge a step's output payload into a target's input map.
///
/// Object outputs merge key-by-key; anything else lands under the fallback
/// key (the source node's ID, or `"trigger"` for root inputs).
fn merge_payload(target: &mut Map<String, Value>, payload: Option<Value>, fallback_key: &str) {
    match payload {
        Some(Value::Object(map)) => {
            for (k, v) in map {
                target.insert(k, v);
            }
        }
        Some(other) => {
            target.insert(fallback_key.to_string(), other);
        }
        None => {}
    }
}

// ---------------------------------------------------------------------------
// DriverError
// ---------------------------------------------------------------------------

/// Errors from workflow run orchestration.
///
/// Node failures are never errors -- they are outcomes recorded on the run.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The workflow does not exist.
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    /// Structural graph problem (cycle, dangling edge, empty graph).
    #[error("workflow graph error: {0}")]
    Graph(#[from] GraphError),

    /// Storage failure while persisting run state.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// A spawned node task panicked or was aborted.
    #[error("task join error: {0}")]
    Join(String),

    /// No running execution with that ID (cancel).
    #[error("workflow run not found: {0}")]
    RunNotFound(Uuid),

    /// Internal bookkeeping referenced a node the graph does not know.
    #[error("driver state corrupt for node {0}")]
    CorruptState(Uuid),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::step_runner::StepRunnerError;
    use cronflow_types::workflow::{NodePosition, Workflow, WorkflowConnection};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    // -----------------------------------------------------------------------
    // In-memory workflow repository
    // -----------------------------------------------------------------------

    #[derive(Default)]
    struct RepoState {
        workflows: HashMap<Uuid, Workflow>,
        nodes: Vec<WorkflowNode>,
        connections: Vec<WorkflowConnection>,
        executions: HashMap<Uuid, WorkflowExecution>,
        events: Vec<WorkflowExecutionEvent>,
    }

    #[derive(Clone, Default)]
    struct MemRepo {
        state: Arc<Mutex<RepoState>>,
    }

    impl MemRepo {
        fn executions(&self) -> Vec<WorkflowExecution> {
            self.state.lock().unwrap().executions.values().cloned().collect()
        }

        fn events_for(&self, execution_id: Uuid) -> Vec<WorkflowExecutionEvent> {
            let mut events: Vec<_> = self
                .state
                .lock()
                .unwrap()
                .events
                .iter()
                .filter(|e| e.workflow_execution_id == execution_id)
                .cloned()
                .collect();
            events.sort_by_key(|e| e.sequence_order);
            events
        }

        fn event_for_node(&self, execution_id: Uuid, node_id: Uuid) -> WorkflowExecutionEvent {
            self.events_for(execution_id)
                .into_iter()
                .find(|e| e.node_id == node_id)
                .expect("event row for node")
        }
    }

    impl WorkflowRepository for MemRepo {
        async fn create_workflow(
            &self,
            workflow: &Workflow,
            nodes: &[WorkflowNode],
            connections: &[WorkflowConnection],
        ) -> Result<(), RepositoryError> {
            let mut state = self.state.lock().unwrap();
            state.workflows.insert(workflow.id, workflow.clone());
            state.nodes.extend_from_slice(nodes);
            state.connections.extend_from_slice(connections);
            Ok(())
        }

        async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
            Ok(self.state.lock().unwrap().workflows.get(id).cloned())
        }

        async fn list_nodes(
            &self,
            workflow_id: &Uuid,
        ) -> Result<Vec<WorkflowNode>, RepositoryError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .nodes
                .iter()
                .filter(|n| n.workflow_id == *workflow_id)
                .cloned()
                .collect())
        }

        async fn list_connections(
            &self,
            workflow_id: &Uuid,
        ) -> Result<Vec<WorkflowConnection>, RepositoryError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .connections
                .iter()
                .filter(|c| c.workflow_id == *workflow_id)
                .cloned()
                .collect())
        }

        async fn delete_workflow(&self, id: &Uuid) -> Result<bool, RepositoryError> {
            let mut state = self.state.lock().unwrap();
            let existed = state.workflows.remove(id).is_some();
            state.nodes.retain(|n| n.workflow_id != *id);
            state.connections.retain(|c| c.workflow_id != *id);
            Ok(existed)
        }

        async fn create_execution(
            &self,
            execution: &WorkflowExecution,
        ) -> Result<(), RepositoryError> {
            self.state
                .lock()
                .unwrap()
                .executions
                .insert(execution.id, execution.clone());
            Ok(())
        }

        async fn update_execution(
            &self,
            execution: &WorkflowExecution,
        ) -> Result<(), RepositoryError> {
            let mut state = self.state.lock().unwrap();
            if !state.executions.contains_key(&execution.id) {
                return Err(RepositoryError::NotFound);
            }
            state.executions.insert(execution.id, execution.clone());
            Ok(())
        }

        async fn get_execution(
            &self,
            id: &Uuid,
        ) -> Result<Option<WorkflowExecution>, RepositoryError> {
            Ok(self.state.lock().unwrap().executions.get(id).cloned())
        }

        async fn list_executions(
            &self,
            workflow_id: &Uuid,
            limit: u32,
        ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
            let mut runs: Vec<_> = self
                .state
                .lock()
                .unwrap()
                .executions
                .values()
                .filter(|e| e.workflow_id == *workflow_id)
                .cloned()
                .collect();
            runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            runs.truncate(limit as usize);
            Ok(runs)
        }

        async fn create_event(
            &self,
            event: &WorkflowExecutionEvent,
        ) -> Result<(), RepositoryError> {
            self.state.lock().unwrap().events.push(event.clone());
            Ok(())
        }

        async fn update_event(
            &self,
            event_id: &Uuid,
            status: NodeEventStatus,
            output: Option<&Value>,
            error: Option<&str>,
        ) -> Result<(), RepositoryError> {
            let mut state = self.state.lock().unwrap();
            let event = state
                .events
                .iter_mut()
                .find(|e| e.id == *event_id)
                .ok_or(RepositoryError::NotFound)?;
            event.status = status;
            event.output = output.cloned();
            event.error = error.map(String::from);
            let completed_at = Utc::now();
            event.completed_at = Some(completed_at);
            event.duration_ms = event
                .started_at
                .map(|s| (completed_at - s).num_milliseconds());
            Ok(())
        }

        async fn list_events(
            &self,
            workflow_execution_id: &Uuid,
        ) -> Result<Vec<WorkflowExecutionEvent>, RepositoryError> {
            Ok(self.events_for(*workflow_execution_id))
        }

        async fn list_stuck_executions(&self) -> Result<Vec<WorkflowExecution>, RepositoryError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .executions
                .values()
                .filter(|e| !e.status.is_terminal())
                .cloned()
                .collect())
        }
    }

    // -----------------------------------------------------------------------
    // Scripted step runner
    // -----------------------------------------------------------------------

    #[derive(Clone)]
    struct Script {
        delay: Duration,
        gate: Option<Arc<Notify>>,
        outcome: StepOutcome,
    }

    #[derive(Clone, Default)]
    struct ScriptedRunner {
        scripts: Arc<Mutex<HashMap<Uuid, Script>>>,
        invocations: Arc<Mutex<Vec<(Uuid, Value)>>>,
    }

    impl ScriptedRunner {
        fn script(&self, node_id: Uuid, outcome: StepOutcome) {
            self.script_with(node_id, Duration::ZERO, None, outcome);
        }

        fn script_with(
            &self,
            node_id: Uuid,
            delay: Duration,
            gate: Option<Arc<Notify>>,
            outcome: StepOutcome,
        ) {
            self.scripts.lock().unwrap().insert(
                node_id,
                Script {
                    delay,
                    gate,
                    outcome,
                },
            );
        }

        fn invocations_of(&self, node_id: Uuid) -> usize {
            self.invocations
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _)| *id == node_id)
                .count()
        }

        fn input_of(&self, node_id: Uuid) -> Value {
            self.invocations
                .lock()
                .unwrap()
                .iter()
                .find(|(id, _)| *id == node_id)
                .map(|(_, input)| input.clone())
                .expect("node was invoked")
        }
    }

    impl StepRunner for ScriptedRunner {
        async fn run(
            &self,
            node: &WorkflowNode,
            input: &Value,
        ) -> Result<StepOutcome, StepRunnerError> {
            self.invocations
                .lock()
                .unwrap()
                .push((node.id, input.clone()));
            let script = self.scripts.lock().unwrap().get(&node.id).cloned();
            match script {
                Some(script) => {
                    if script.delay > Duration::ZERO {
                        tokio::time::sleep(script.delay).await;
                    }
                    if let Some(gate) = script.gate {
                        gate.notified().await;
                    }
                    Ok(script.outcome)
                }
                None => Ok(StepOutcome::success()),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Fixtures
    // -----------------------------------------------------------------------

    fn workflow() -> Workflow {
        let now = Utc::now();
        Workflow {
            id: Uuid::now_v7(),
            name: "test workflow".to_string(),
            user_id: Uuid::now_v7(),
            description: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn node(workflow_id: Uuid) -> WorkflowNode {
        WorkflowNode {
            id: Uuid::now_v7(),
            workflow_id,
            event_id: Uuid::now_v7(),
            position: NodePosition { x: 0.0, y: 0.0 },
        }
    }

    fn edge(
        workflow_id: Uuid,
        source: &WorkflowNode,
        target: &WorkflowNode,
        connection_type: ConnectionType,
    ) -> WorkflowConnection {
        WorkflowConnection {
            id: Uuid::now_v7(),
            workflow_id,
            source_node_id: source.id,
            target_node_id: target.id,
            connection_type,
        }
    }

    async fn seed(
        repo: &MemRepo,
        nodes: Vec<WorkflowNode>,
        connections: Vec<WorkflowConnection>,
    ) -> Uuid {
        let mut wf = workflow();
        wf.id = nodes
            .first()
            .map(|n| n.workflow_id)
            .unwrap_or_else(Uuid::now_v7);
        repo.create_workflow(&wf, &nodes, &connections).await.unwrap();
        wf.id
    }

    // -----------------------------------------------------------------------
    // Data flow and ordering
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn linear_chain_passes_output_downstream() {
        let wf_id = Uuid::now_v7();
        let (a, b) = (node(wf_id), node(wf_id));
        let repo = MemRepo::default();
        let runner = ScriptedRunner::default();
        runner.script(
            a.id,
            StepOutcome::success().with_output(serde_json::json!({"rows": 3})),
        );
        runner.script(b.id, StepOutcome::success());

        let connections = vec![edge(wf_id, &a, &b, ConnectionType::OnSuccess)];
        seed(&repo, vec![a.clone(), b.clone()], connections).await;

        let driver = GraphDriver::new(repo.clone(), runner.clone());
        let result = driver
            .execute_workflow(wf_id, "manual", None, Some(serde_json::json!({"seed": 1})))
            .await
            .unwrap();

        assert!(result.success);
        // Root got the trigger payload; B got A's output merged in.
        assert_eq!(runner.input_of(a.id)["seed"], 1);
        assert_eq!(runner.input_of(b.id)["rows"], 3);
        // Accumulated run output carries A's contribution.
        assert_eq!(result.output["rows"], 3);

        let events = repo.events_for(result.execution_id);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence_order, 1);
        assert_eq!(events[0].node_id, a.id);
        assert_eq!(events[1].sequence_order, 2);
        assert_eq!(events[1].node_id, b.id);
        assert_eq!(events[1].triggered_by_connection, Some(ConnectionType::OnSuccess));
        assert!(events.iter().all(|e| e.status == NodeEventStatus::Success));
    }

    #[tokio::test]
    async fn join_dispatches_exactly_once_after_both_predecessors() {
        let wf_id = Uuid::now_v7();
        let (a, b, c) = (node(wf_id), node(wf_id), node(wf_id));
        let repo = MemRepo::default();
        let runner = ScriptedRunner::default();

        let connections = vec![
            edge(wf_id, &a, &c, ConnectionType::Always),
            edge(wf_id, &b, &c, ConnectionType::Always),
        ];
        seed(&repo, vec![a.clone(), b.clone(), c.clone()], connections).await;

        let driver = GraphDriver::new(repo.clone(), runner.clone());
        let result = driver
            .execute_workflow(wf_id, "manual", None, None)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(runner.invocations_of(c.id), 1, "join must dispatch once");

        // C dispatched after both roots: highest sequence order.
        let c_event = repo.event_for_node(result.execution_id, c.id);
        assert_eq!(c_event.sequence_order, 3);

        let execution = repo.executions().into_iter().next().unwrap();
        assert_eq!(execution.total_events, 3);
        assert_eq!(execution.successful_events, 3);
        assert_eq!(execution.status, WorkflowExecutionStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn independent_branches_run_concurrently() {
        let wf_id = Uuid::now_v7();
        let (a, b, c) = (node(wf_id), node(wf_id), node(wf_id));
        let repo = MemRepo::default();
        let runner = ScriptedRunner::default();
        runner.script_with(a.id, Duration::from_secs(2), None, StepOutcome::success());
        runner.script_with(b.id, Duration::from_secs(2), None, StepOutcome::success());

        let connections = vec![
            edge(wf_id, &a, &c, ConnectionType::Always),
            edge(wf_id, &b, &c, ConnectionType::Always),
        ];
        seed(&repo, vec![a.clone(), b.clone(), c.clone()], connections).await;

        let driver = GraphDriver::new(repo.clone(), runner.clone());
        let started = tokio::time::Instant::now();
        let result = driver
            .execute_workflow(wf_id, "manual", None, None)
            .await
            .unwrap();

        assert!(result.success);
        // Two 2s branches in parallel: well under the 4s a serial walk takes.
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "branches did not run concurrently: {:?}",
            started.elapsed()
        );
    }

    // -----------------------------------------------------------------------
    // Edge gates
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn failed_node_fires_on_failure_not_on_success() {
        let wf_id = Uuid::now_v7();
        let (a, b, c) = (node(wf_id), node(wf_id), node(wf_id));
        let repo = MemRepo::default();
        let runner = ScriptedRunner::default();
        runner.script(a.id, StepOutcome::failure());

        let connections = vec![
            edge(wf_id, &a, &b, ConnectionType::OnSuccess),
            edge(wf_id, &a, &c, ConnectionType::OnFailure),
        ];
        seed(&repo, vec![a.clone(), b.clone(), c.clone()], connections).await;

        let driver = GraphDriver::new(repo.clone(), runner.clone());
        let result = driver
            .execute_workflow(wf_id, "manual", None, None)
            .await
            .unwrap();

        assert_eq!(runner.invocations_of(b.id), 0, "ON_SUCCESS must not fire");
        assert_eq!(runner.invocations_of(c.id), 1, "ON_FAILURE must fire");

        let b_event = repo.event_for_node(result.execution_id, b.id);
        assert_eq!(b_event.status, NodeEventStatus::Skipped);

        // A failed, so the run is failure even though C succeeded.
        assert!(!result.success);
        let execution = repo.executions().into_iter().next().unwrap();
        assert_eq!(execution.status, WorkflowExecutionStatus::Failure);
        assert_eq!(execution.total_events, 2);
        assert_eq!(execution.failed_events, 1);
        assert_eq!(execution.successful_events, 1);
    }

    #[tokio::test]
    async fn on_condition_requires_explicit_true_flag() {
        // Run 1: condition flag false -> target skipped.
        let wf_id = Uuid::now_v7();
        let (a, b) = (node(wf_id), node(wf_id));
        let repo = MemRepo::default();
        let runner = ScriptedRunner::default();
        runner.script(a.id, StepOutcome::success().with_condition(false));
        let connections = vec![edge(wf_id, &a, &b, ConnectionType::OnCondition)];
        seed(&repo, vec![a.clone(), b.clone()], connections).await;

        let driver = GraphDriver::new(repo.clone(), runner.clone());
        let result = driver
            .execute_workflow(wf_id, "manual", None, None)
            .await
            .unwrap();
        assert_eq!(runner.invocations_of(b.id), 0);
        assert_eq!(
            repo.event_for_node(result.execution_id, b.id).status,
            NodeEventStatus::Skipped
        );
        assert!(result.success, "skips alone do not fail the run");

        // Run 2: condition flag true -> target dispatched.
        let wf_id = Uuid::now_v7();
        let (a, b) = (node(wf_id), node(wf_id));
        let repo = MemRepo::default();
        let runner = ScriptedRunner::default();
        runner.script(a.id, StepOutcome::success().with_condition(true));
        let connections = vec![edge(wf_id, &a, &b, ConnectionType::OnCondition)];
        seed(&repo, vec![a.clone(), b.clone()], connections).await;

        let driver = GraphDriver::new(repo.clone(), runner.clone());
        let result = driver
            .execute_workflow(wf_id, "manual", None, None)
            .await
            .unwrap();
        assert_eq!(runner.invocations_of(b.id), 1);
        assert_eq!(
            repo.event_for_node(result.execution_id, b.id)
                .triggered_by_connection,
            Some(ConnectionType::OnCondition)
        );
        assert!(result.success);
    }

    #[tokio::test]
    async fn skip_propagates_through_downstream_nodes() {
        // A fails; A -ON_SUCCESS-> B -ALWAYS-> C. B is skipped and so is C,
        // even though C's edge is ALWAYS.
        let wf_id = Uuid::now_v7();
        let (a, b, c) = (node(wf_id), node(wf_id), node(wf_id));
        let repo = MemRepo::default();
        let runner = ScriptedRunner::default();
        runner.script(a.id, StepOutcome::failure());

        let connections = vec![
            edge(wf_id, &a, &b, ConnectionType::OnSuccess),
            edge(wf_id, &b, &c, ConnectionType::Always),
        ];
        seed(&repo, vec![a.clone(), b.clone(), c.clone()], connections).await;

        let driver = GraphDriver::new(repo.clone(), runner.clone());
        let result = driver
            .execute_workflow(wf_id, "manual", None, None)
            .await
            .unwrap();

        assert_eq!(runner.invocations_of(b.id), 0);
        assert_eq!(runner.invocations_of(c.id), 0);
        assert_eq!(
            repo.event_for_node(result.execution_id, b.id).status,
            NodeEventStatus::Skipped
        );
        assert_eq!(
            repo.event_for_node(result.execution_id, c.id).status,
            NodeEventStatus::Skipped
        );
        // Persisted state fully reflects the run: one failure, two skips.
        assert_eq!(repo.events_for(result.execution_id).len(), 3);
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn cancellation_drains_in_flight_and_stops_dispatch() {
        let wf_id = Uuid::now_v7();
        let (a, b) = (node(wf_id), node(wf_id));
        let repo = MemRepo::default();
        let runner = ScriptedRunner::default();
        let gate = Arc::new(Notify::new());
        runner.script_with(a.id, Duration::ZERO, Some(Arc::clone(&gate)), StepOutcome::success());

        let connections = vec![edge(wf_id, &a, &b, ConnectionType::OnSuccess)];
        seed(&repo, vec![a.clone(), b.clone()], connections).await;

        let driver = Arc::new(GraphDriver::new(repo.clone(), runner.clone()));
        let handle = {
            let driver = Arc::clone(&driver);
            tokio::spawn(async move { driver.execute_workflow(wf_id, "manual", None, None).await })
        };

        // Wait until the run record exists, then cancel while A is blocked.
        let execution_id = loop {
            if let Some(execution) = repo.executions().into_iter().next() {
                break execution.id;
            }
            tokio::task::yield_now().await;
        };
        driver.cancel(execution_id).unwrap();
        gate.notify_one();

        let result = handle.await.unwrap().unwrap();
        assert!(!result.success, "cancelled run terminates as failure");
        assert_eq!(runner.invocations_of(a.id), 1, "in-flight step drained");
        assert_eq!(runner.invocations_of(b.id), 0, "no dispatch after cancel");
        assert_eq!(
            repo.event_for_node(execution_id, b.id).status,
            NodeEventStatus::Skipped
        );

        let execution = repo.get_execution(&execution_id).await.unwrap().unwrap();
        assert_eq!(execution.status, WorkflowExecutionStatus::Failure);
        assert_eq!(execution.successful_events, 1, "A still finished cleanly");

        // Token is gone once the run finished.
        assert!(matches!(
            driver.cancel(execution_id),
            Err(DriverError::RunNotFound(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Structural errors
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn unknown_workflow_is_not_found() {
        let repo = MemRepo::default();
        let driver = GraphDriver::new(repo, ScriptedRunner::default());
        let err = driver
            .execute_workflow(Uuid::now_v7(), "manual", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::WorkflowNotFound(_)));
    }

    #[tokio::test]
    async fn cyclic_graph_fails_before_any_dispatch() {
        let wf_id = Uuid::now_v7();
        let (a, b) = (node(wf_id), node(wf_id));
        let repo = MemRepo::default();
        let runner = ScriptedRunner::default();
        let connections = vec![
            edge(wf_id, &a, &b, ConnectionType::Always),
            edge(wf_id, &b, &a, ConnectionType::Always),
        ];
        seed(&repo, vec![a.clone(), b.clone()], connections).await;

        let driver = GraphDriver::new(repo.clone(), runner.clone());
        let err = driver
            .execute_workflow(wf_id, "manual", None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, DriverError::Graph(GraphError::CycleDetected(_))));
        assert!(repo.executions().is_empty(), "no run record for a bad graph");
        assert_eq!(runner.invocations_of(a.id), 0);
    }

    #[tokio::test]
    async fn runner_error_is_a_node_failure_not_a_driver_error() {
        struct FailingRunner;
        impl StepRunner for FailingRunner {
            async fn run(
                &self,
                _node: &WorkflowNode,
                _input: &Value,
            ) -> Result<StepOutcome, StepRunnerError> {
                Err(StepRunnerError("agent unreachable".to_string()))
            }
        }

        let wf_id = Uuid::now_v7();
        let a = node(wf_id);
        let repo = MemRepo::default();
        seed(&repo, vec![a.clone()], vec![]).await;

        let driver = GraphDriver::new(repo.clone(), FailingRunner);
        let result = driver
            .execute_workflow(wf_id, "manual", None, None)
            .await
            .unwrap();

        assert!(!result.success);
        let event = repo.event_for_node(result.execution_id, a.id);
        assert_eq!(event.status, NodeEventStatus::Failure);
        assert!(event.error.as_deref().unwrap().contains("agent unreachable"));
    }
}
