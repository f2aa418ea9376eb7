//! Graph driver
//!
//! The topology is a table: node id -> handler, node id -> outgoing edge.
//! The driver runs the entry node, merges its update, follows the edge,
//! and stops after the terminal node.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error, info};

use super::classify::Classification;
use super::nodes::{all_nodes, Node, NodeContext, NodeId};
use super::state::{ReasoningMode, TurnState};

/// Where a node hands off to
#[derive(Clone, Copy)]
pub enum Edge {
    Always(NodeId),
    Branch(fn(&TurnState) -> NodeId),
    End,
}

/// Chitchat answers directly; everything else gathers context first
pub fn route_after_classification(state: &TurnState) -> NodeId {
    match state.classification {
        Some(Classification::Chitchat) => NodeId::ResponseSynthesis,
        _ => NodeId::ContextSelection,
    }
}

pub fn route_by_reasoning_mode(state: &TurnState) -> NodeId {
    match state.reasoning_mode {
        Some(ReasoningMode::Deep) => NodeId::DeepReasoning,
        _ => NodeId::StandardReasoning,
    }
}

/// Outgoing edges, in node table order
pub const EDGES: &[(NodeId, Edge)] = &[
    (
        NodeId::IntentClassification,
        Edge::Branch(route_after_classification),
    ),
    (
        NodeId::ContextSelection,
        Edge::Always(NodeId::PrecisionRouter),
    ),
    (
        NodeId::PrecisionRouter,
        Edge::Branch(route_by_reasoning_mode),
    ),
    (
        NodeId::StandardReasoning,
        Edge::Always(NodeId::ToolExecution),
    ),
    (NodeId::DeepReasoning, Edge::Always(NodeId::ToolExecution)),
    (
        NodeId::ToolExecution,
        Edge::Always(NodeId::ResponseSynthesis),
    ),
    (NodeId::ResponseSynthesis, Edge::End),
];

/// Final state plus the nodes visited, in order
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub state: TurnState,
    pub path: Vec<NodeId>,
}

impl TurnOutcome {
    pub fn visited(&self, node: NodeId) -> bool {
        self.path.contains(&node)
    }
}

pub struct Graph {
    nodes: HashMap<NodeId, Arc<dyn Node>>,
    edges: HashMap<NodeId, Edge>,
    entry: NodeId,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// The fixed turn topology
    pub fn new() -> Self {
        Self {
            nodes: all_nodes().into_iter().map(|n| (n.id(), n)).collect(),
            edges: EDGES.iter().copied().collect(),
            entry: NodeId::IntentClassification,
        }
    }

    fn next(&self, current: NodeId, state: &TurnState) -> Option<NodeId> {
        match self.edges.get(&current)? {
            Edge::Always(next) => Some(*next),
            Edge::Branch(route) => Some(route(state)),
            Edge::End => None,
        }
    }

    /// Run one turn from the entry node to the terminal node
    pub async fn run(&self, mut state: TurnState, ctx: &NodeContext) -> TurnOutcome {
        let mut path = Vec::with_capacity(self.nodes.len());
        let mut visited = HashSet::new();
        let mut current = Some(self.entry);

        while let Some(id) = current {
            if !visited.insert(id) {
                error!(node = %id, "Node revisited, stopping turn");
                break;
            }
            let Some(node) = self.nodes.get(&id) else {
                error!(node = %id, "No handler registered for node");
                break;
            };

            info!(node = %id, "Running node");
            let update = node.run(&state, ctx).await;
            state.apply(update);
            path.push(id);

            current = self.next(id, &state);
            if let Some(next) = current {
                debug!(from = %id, to = %next, "Transition");
            }
        }

        TurnOutcome { state, path }
    }
}
