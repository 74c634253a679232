//! Node and Pod resources - the entities of the simulated cluster
//!
//! A Node is a simulated worker machine (a "ship") with a fixed number of pod
//! slots. Each Node:
//! - Hosts pods in arrival order
//! - Is either `Ready` or `NotReady`; a crashed node never becomes ready again
//! - Never holds more pods than its capacity while `Ready`
//!
//! A Pod (a "shipping container") belongs to at most one Node at a time.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a node, unique for the lifetime of a cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

/// Identifier of a pod, unique for the lifetime of a cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PodId(String);

impl NodeId {
    /// Build the id for the n-th node ever created
    pub fn from_sequence(n: u64) -> Self {
        Self(format!("node-{}", n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PodId {
    /// Build the id for the n-th pod ever created
    pub fn from_sequence(n: u64) -> Self {
        Self(format!("pod-{}", n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PodId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodStatus {
    /// Pod is waiting for a slot (in a reschedule set, or dropped from one)
    Pending,
    /// Pod is running on a ready node
    Running,
    /// Pod sits on a node that has failed
    Crashed,
}

/// Status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NodeStatus {
    /// Node is healthy and accepts pods
    #[default]
    Ready,
    /// Node has failed; it never receives new pods
    NotReady,
}

/// A Pod - the smallest deployable unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    /// Immutable identifier
    pub id: PodId,

    /// Display label, not unique
    pub name: String,

    /// Current status, derived from the owning node's health
    pub status: PodStatus,
}

impl Pod {
    /// Create a running pod
    pub fn new(id: PodId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: PodStatus::Running,
        }
    }

    /// Return the pod with a different status
    pub fn with_status(mut self, status: PodStatus) -> Self {
        self.status = status;
        self
    }
}

/// A Node in the simulated cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Immutable identifier
    pub id: NodeId,

    /// Display label
    pub name: String,

    /// Maximum number of pods this node may host
    pub capacity: usize,

    /// Hosted pods in arrival order
    #[serde(default)]
    pub pods: Vec<Pod>,

    /// Health of the node
    pub status: NodeStatus,
}

impl Node {
    /// Create an empty, ready node
    pub fn new(id: NodeId, name: impl Into<String>, capacity: usize) -> Self {
        Self {
            id,
            name: name.into(),
            capacity,
            pods: Vec::new(),
            status: NodeStatus::Ready,
        }
    }

    /// Check if node is ready
    pub fn is_ready(&self) -> bool {
        self.status == NodeStatus::Ready
    }

    /// Number of hosted pods
    pub fn pod_count(&self) -> usize {
        self.pods.len()
    }

    /// Number of unused pod slots
    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.pods.len())
    }

    /// Check if node has room for another pod
    pub fn has_capacity(&self) -> bool {
        self.pods.len() < self.capacity
    }

    /// Check if node can accept a new pod right now
    pub fn can_schedule(&self) -> bool {
        self.is_ready() && self.has_capacity()
    }

    /// Mark the node failed; its pods stay attached but are shown as crashed
    pub(crate) fn mark_not_ready(&mut self) {
        self.status = NodeStatus::NotReady;
        for pod in &mut self.pods {
            pod.status = PodStatus::Crashed;
        }
    }
}
