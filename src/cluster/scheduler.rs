//! First-fit scheduler
//!
//! Placement is a pure function of the ordered node list: the first node that
//! is `Ready` and below capacity wins. No scoring, no randomness, so the same
//! cluster always yields the same decision.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::node::{Node, NodeId};

/// No node can accept another pod
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Cluster full: none of {nodes} node(s) ({ready_nodes} ready) has a free slot")]
pub struct ClusterFull {
    /// Nodes scanned
    pub nodes: usize,
    /// Ready nodes among them (all at capacity)
    pub ready_nodes: usize,
}

/// Position of the first schedulable node, in cluster order
pub fn first_fit_index(nodes: &[Node]) -> Result<usize, ClusterFull> {
    nodes
        .iter()
        .position(Node::can_schedule)
        .ok_or_else(|| ClusterFull {
            nodes: nodes.len(),
            ready_nodes: nodes.iter().filter(|n| n.is_ready()).count(),
        })
}

/// Choose the node that should receive a new pod
pub fn first_fit(nodes: &[Node]) -> Result<NodeId, ClusterFull> {
    first_fit_index(nodes).map(|i| nodes[i].id.clone())
}
