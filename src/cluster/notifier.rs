//! Change notifier - publishes cluster snapshots to subscribers
//!
//! Every mutation of the cluster store produces exactly one [`Snapshot`],
//! a fully materialized copy of the nodes and their pods. Subscribers (the
//! renderer, WebSocket watchers, tests) receive snapshots in publication
//! order and can never reach back into the store through them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::node::Node;

/// Overall health as shown on the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterHealth {
    /// Every node is ready
    Healthy,
    /// At least one node is not ready
    Degraded,
}

/// Aggregate figures for a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStats {
    #[serde(rename = "totalNodes")]
    pub total_nodes: usize,
    #[serde(rename = "readyNodes")]
    pub ready_nodes: usize,
    #[serde(rename = "totalPods")]
    pub total_pods: usize,
    /// Slots across ready nodes
    #[serde(rename = "totalCapacity")]
    pub total_capacity: usize,
    /// Unused slots across ready nodes
    #[serde(rename = "freeSlots")]
    pub free_slots: usize,
    /// Pods lost to recovery overflow since startup
    #[serde(rename = "droppedPods")]
    pub dropped_pods: u64,
    pub health: ClusterHealth,
}

impl ClusterStats {
    /// Compute stats for a node list
    pub fn from_nodes(nodes: &[Node], dropped_pods: u64) -> Self {
        let ready: Vec<&Node> = nodes.iter().filter(|n| n.is_ready()).collect();
        let health = if ready.len() == nodes.len() {
            ClusterHealth::Healthy
        } else {
            ClusterHealth::Degraded
        };

        Self {
            total_nodes: nodes.len(),
            ready_nodes: ready.len(),
            total_pods: nodes.iter().map(Node::pod_count).sum(),
            total_capacity: ready.iter().map(|n| n.capacity).sum(),
            free_slots: ready.iter().map(|n| n.free_slots()).sum(),
            dropped_pods,
            health,
        }
    }
}

/// Immutable view of the cluster after one mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Increments by one per published mutation; 0 is the bootstrap state
    pub version: u64,

    /// Virtual clock at publication
    #[serde(rename = "clockMs")]
    pub clock_ms: u64,

    /// Wall-clock publication time
    #[serde(rename = "publishedAt")]
    pub published_at: DateTime<Utc>,

    /// Nodes in cluster order, with their pods
    pub nodes: Vec<Node>,

    pub stats: ClusterStats,
}

impl Snapshot {
    /// Build a snapshot from the live node list
    pub fn capture(version: u64, clock_ms: u64, nodes: &[Node], dropped_pods: u64) -> Self {
        Self {
            version,
            clock_ms,
            published_at: Utc::now(),
            nodes: nodes.to_vec(),
            stats: ClusterStats::from_nodes(nodes, dropped_pods),
        }
    }

    /// Find a node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id.as_str() == id)
    }

    /// Total pods across all nodes
    pub fn total_pods(&self) -> usize {
        self.stats.total_pods
    }
}

/// Receiving end of a snapshot subscription
pub type SnapshotReceiver = broadcast::Receiver<Arc<Snapshot>>;

/// Fans snapshots out to subscribers
pub struct ChangeNotifier {
    sender: broadcast::Sender<Arc<Snapshot>>,
    latest: Arc<Snapshot>,
}

impl ChangeNotifier {
    /// Create a notifier seeded with the initial snapshot
    ///
    /// `buffer` bounds how many snapshots a slow subscriber may fall behind
    /// before it observes a lag error.
    pub fn new(initial: Snapshot, buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            sender,
            latest: Arc::new(initial),
        }
    }

    /// Publish a snapshot to every subscriber
    pub fn publish(&mut self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        self.latest = Arc::clone(&snapshot);
        // No subscribers is fine; the latest snapshot is still kept
        let _ = self.sender.send(Arc::clone(&snapshot));
        snapshot
    }

    /// Most recently published snapshot
    pub fn latest(&self) -> Arc<Snapshot> {
        Arc::clone(&self.latest)
    }

    /// Subscribe to future snapshots
    pub fn subscribe(&self) -> SnapshotReceiver {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
