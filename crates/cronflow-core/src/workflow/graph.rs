//! Workflow graph construction, validation, and adjacency queries.
//!
//! Uses `petgraph` to verify the node/connection set forms a DAG before any
//! dispatch happens. Structural problems (cycles, edges referencing unknown
//! nodes) are fatal at workflow-start time, never mid-run.

use std::collections::{HashMap, HashSet};

use cronflow_types::error::GraphError;
use cronflow_types::workflow::{WorkflowConnection, WorkflowNode};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// WorkflowGraph
// ---------------------------------------------------------------------------

/// Validated adjacency view over a workflow's nodes and connections.
///
/// The in-degree of a node counts **distinct source nodes** with an edge
/// into it, so parallel edges from the same source resolve together and a
/// join waits for each predecessor exactly once.
#[derive(Debug)]
pub struct WorkflowGraph {
    nodes: HashMap<Uuid, WorkflowNode>,
    /// Outgoing connections keyed by source node.
    outgoing: HashMap<Uuid, Vec<WorkflowConnection>>,
    /// Distinct-source in-degree per node.
    in_degree: HashMap<Uuid, usize>,
}

impl WorkflowGraph {
    /// Build and validate the graph.
    ///
    /// Fails if the workflow has no nodes, if any connection references a
    /// node outside the set, or if the edges contain a cycle.
    pub fn new(
        nodes: Vec<WorkflowNode>,
        connections: Vec<WorkflowConnection>,
    ) -> Result<Self, GraphError> {
        if nodes.is_empty() {
            return Err(GraphError::Empty);
        }

        let node_map: HashMap<Uuid, WorkflowNode> =
            nodes.into_iter().map(|n| (n.id, n)).collect();

        for conn in &connections {
            for endpoint in [conn.source_node_id, conn.target_node_id] {
                if !node_map.contains_key(&endpoint) {
                    return Err(GraphError::DanglingNode {
                        connection_id: conn.id,
                        node_id: endpoint,
                    });
                }
            }
        }

        // Cycle check via toposort over the distinct-edge graph.
        let mut graph = DiGraph::<Uuid, ()>::new();
        let mut petgraph_idx = HashMap::new();
        for id in node_map.keys() {
            petgraph_idx.insert(*id, graph.add_node(*id));
        }
        for conn in &connections {
            graph.add_edge(
                petgraph_idx[&conn.source_node_id],
                petgraph_idx[&conn.target_node_id],
                (),
            );
        }
        toposort(&graph, None).map_err(|cycle| {
            GraphError::CycleDetected(graph[cycle.node_id()])
        })?;

        // Distinct-source in-degree: parallel edges from one source count once.
        let mut sources_per_target: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
        let mut outgoing: HashMap<Uuid, Vec<WorkflowConnection>> = HashMap::new();
        for conn in connections {
            sources_per_target
                .entry(conn.target_node_id)
                .or_default()
                .insert(conn.source_node_id);
            outgoing.entry(conn.source_node_id).or_default().push(conn);
        }
        let in_degree = node_map
            .keys()
            .map(|id| {
                let degree = sources_per_target.get(id).map_or(0, HashSet::len);
                (*id, degree)
            })
            .collect();

        Ok(Self {
            nodes: node_map,
            outgoing,
            in_degree,
        })
    }

    /// Nodes with no inbound edges -- where traversal starts.
    pub fn roots(&self) -> Vec<&WorkflowNode> {
        let mut roots: Vec<_> = self
            .nodes
            .values()
            .filter(|n| self.in_degree[&n.id] == 0)
            .collect();
        roots.sort_by_key(|n| n.id);
        roots
    }

    /// Outgoing connections from a node, empty for leaves.
    pub fn outgoing(&self, node_id: &Uuid) -> &[WorkflowConnection] {
        self.outgoing.get(node_id).map_or(&[], Vec::as_slice)
    }

    /// Distinct-source in-degree of a node.
    pub fn in_degree(&self, node_id: &Uuid) -> usize {
        self.in_degree.get(node_id).copied().unwrap_or(0)
    }

    /// Look up a node by ID.
    pub fn node(&self, node_id: &Uuid) -> Option<&WorkflowNode> {
        self.nodes.get(node_id)
    }

    /// All node IDs in the graph.
    pub fn node_ids(&self) -> impl Iterator<Item = &Uuid> {
        self.nodes.keys()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
