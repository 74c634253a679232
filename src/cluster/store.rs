//! Cluster State Store - the single source of truth for the simulation
//!
//! The store is responsible for:
//! - Owning the ordered node list and every pod placed on it
//! - Running every mutation (add/remove node, add pod, crash node, recovery)
//! - Queueing crash recoveries on its virtual clock
//! - Publishing one snapshot per mutation
//!
//! Mutations take `&mut self`, so only one can run at a time. Deferred
//! recoveries re-enter through [`ClusterStore::advance`] and therefore see a
//! settled cluster.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::healing::{recover, RecoveryOutcome, RecoveryReport, RecoveryTask};
use super::node::{Node, NodeId, Pod, PodId};
use super::notifier::{ChangeNotifier, ClusterStats, Snapshot, SnapshotReceiver};
use super::scheduler::{first_fit_index, ClusterFull};
use super::timer::TimerQueue;
use super::{INITIAL_NODE_COUNT, MAX_PODS_PER_NODE, RECOVERY_DELAY_MS};

/// How many recovery reports the store keeps around
const RECOVERY_HISTORY_LEN: usize = 32;

/// Errors returned by store commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error(transparent)]
    ClusterFull(#[from] ClusterFull),
}

/// Cluster settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Nodes created at bootstrap
    #[serde(default = "default_initial_nodes")]
    pub initial_nodes: usize,

    /// Pod slots per node
    #[serde(default = "default_pod_capacity")]
    pub pod_capacity: usize,

    /// Delay between a crash and its recovery (virtual milliseconds)
    #[serde(default = "default_recovery_delay_ms")]
    pub recovery_delay_ms: u64,

    /// Snapshots a slow subscriber may lag behind
    #[serde(default = "default_snapshot_buffer")]
    pub snapshot_buffer: usize,

    /// Real-time clock driver resolution (milliseconds)
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            initial_nodes: default_initial_nodes(),
            pod_capacity: default_pod_capacity(),
            recovery_delay_ms: default_recovery_delay_ms(),
            snapshot_buffer: default_snapshot_buffer(),
            tick_ms: default_tick_ms(),
        }
    }
}

fn default_initial_nodes() -> usize {
    INITIAL_NODE_COUNT
}

fn default_pod_capacity() -> usize {
    MAX_PODS_PER_NODE
}

fn default_recovery_delay_ms() -> u64 {
    RECOVERY_DELAY_MS
}

fn default_snapshot_buffer() -> usize {
    64
}

fn default_tick_ms() -> u64 {
    100
}

/// The cluster state store
pub struct ClusterStore {
    config: ClusterConfig,

    /// Nodes in insertion order (the scheduling tie-break order)
    nodes: Vec<Node>,

    next_node_seq: u64,
    next_pod_seq: u64,

    /// Pending crash recoveries on the virtual clock
    recoveries: TimerQueue<RecoveryTask>,

    /// Most recent recovery reports, oldest first
    history: VecDeque<RecoveryReport>,

    dropped_pods_total: u64,
    version: u64,
    notifier: ChangeNotifier,
}

impl ClusterStore {
    /// Create a store with the configured number of bootstrap nodes
    ///
    /// Bootstrap is not a mutation: the resulting state is snapshot version 0.
    pub fn new(config: ClusterConfig) -> Self {
        let initial = Snapshot::capture(0, 0, &[], 0);
        let notifier = ChangeNotifier::new(initial, config.snapshot_buffer);

        let mut store = Self {
            config,
            nodes: Vec::new(),
            next_node_seq: 1,
            next_pod_seq: 1,
            recoveries: TimerQueue::new(),
            history: VecDeque::new(),
            dropped_pods_total: 0,
            version: 0,
            notifier,
        };

        for i in 1..=store.config.initial_nodes {
            store.insert_node(format!("ship-alpha-{}", i));
        }
        let bootstrap = store.capture();
        store.notifier.publish(bootstrap);

        info!(
            "Cluster bootstrapped with {} node(s), {} slot(s) each",
            store.nodes.len(),
            store.config.pod_capacity
        );
        store
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Append a new ready node; a name is generated if none is given
    pub fn add_node(&mut self, name: Option<String>) -> NodeId {
        let name = name.unwrap_or_else(|| format!("ship-beta-{}", self.next_node_seq));
        let id = self.insert_node(name);
        info!("Node {} added", id);
        self.publish();
        id
    }

    /// Remove a node and discard its pods
    ///
    /// Unknown ids are ignored. Returns whether a node was removed.
    pub fn remove_node(&mut self, id: &NodeId) -> bool {
        let Some(idx) = self.position(id) else {
            debug!("Remove ignored: node {} not found", id);
            return false;
        };

        let node = self.nodes.remove(idx);
        if !node.pods.is_empty() {
            info!("Node {} removed, discarding {} pod(s)", id, node.pods.len());
        } else {
            info!("Node {} removed", id);
        }
        self.publish();
        true
    }

    /// Place a new pod with a generated name
    pub fn add_pod(&mut self) -> Result<PodId, StoreError> {
        let name = format!("app-{}", self.next_pod_seq);
        self.add_named_pod(name)
    }

    /// Place a new pod on the first ready node with a free slot
    ///
    /// On `ClusterFull` nothing changes and nothing is published.
    pub fn add_named_pod(&mut self, name: impl Into<String>) -> Result<PodId, StoreError> {
        let idx = first_fit_index(&self.nodes).inspect_err(|full| {
            warn!("Pod rejected: {}", full);
        })?;

        let id = PodId::from_sequence(self.next_pod_seq);
        self.next_pod_seq += 1;

        let node = &mut self.nodes[idx];
        debug!("Scheduling {} onto {}", id, node.id);
        node.pods.push(Pod::new(id.clone(), name));

        self.publish();
        Ok(id)
    }

    /// Fail a node now and queue its recovery
    ///
    /// No-op for unknown nodes and for nodes that are already `NotReady`, so
    /// at most one recovery is ever queued per node. Returns the virtual time
    /// the recovery will fire, if one was queued.
    pub fn crash_node(&mut self, id: &NodeId) -> Option<u64> {
        let now = self.recoveries.now_ms();
        let delay = self.config.recovery_delay_ms;

        let node = match self.position(id) {
            Some(idx) => &mut self.nodes[idx],
            None => {
                debug!("Crash ignored: node {} not found", id);
                return None;
            }
        };

        if !node.is_ready() {
            debug!("Crash ignored: node {} is already NotReady", id);
            return None;
        }

        node.mark_not_ready();
        let fire_at = self.recoveries.schedule(
            delay,
            RecoveryTask {
                node_id: id.clone(),
                crashed_at_ms: now,
            },
        );

        warn!("Node {} crashed; recovery scheduled at t={}ms", id, fire_at);
        self.publish();
        Some(fire_at)
    }

    // =========================================================================
    // Virtual clock
    // =========================================================================

    /// Current virtual time
    pub fn now_ms(&self) -> u64 {
        self.recoveries.now_ms()
    }

    /// Advance the clock by `delta_ms`, firing due recoveries
    pub fn advance(&mut self, delta_ms: u64) -> Vec<RecoveryOutcome> {
        let target = self.now_ms().saturating_add(delta_ms);
        self.advance_to(target)
    }

    /// Advance the clock to `target_ms`, firing due recoveries in order
    ///
    /// Each firing is its own mutation with its own snapshot. Skipped
    /// recoveries (node removed meanwhile) publish nothing.
    pub fn advance_to(&mut self, target_ms: u64) -> Vec<RecoveryOutcome> {
        let mut outcomes = Vec::new();

        while let Some((fired_at, task)) = self.recoveries.pop_due(target_ms) {
            let outcome = recover(&mut self.nodes, &task, fired_at);

            if let RecoveryOutcome::Completed(report) = &outcome {
                if report.has_overflow() {
                    warn!(
                        "Recovery for {} lost {} pod(s): {:?}",
                        report.node_id,
                        report.dropped.len(),
                        report.dropped_ids()
                    );
                }
                self.dropped_pods_total += report.dropped.len() as u64;
                self.history.push_back(report.clone());
                while self.history.len() > RECOVERY_HISTORY_LEN {
                    self.history.pop_front();
                }
                self.publish();
            }

            outcomes.push(outcome);
        }

        self.recoveries.settle_at(target_ms);
        outcomes
    }

    /// Fire every queued recovery, however far in the future
    pub fn run_pending(&mut self) -> Vec<RecoveryOutcome> {
        match self.recoveries.next_due() {
            Some(_) => {
                let last = self
                    .recoveries
                    .iter()
                    .map(|(at, _)| at)
                    .max()
                    .unwrap_or_else(|| self.now_ms());
                self.advance_to(last)
            }
            None => Vec::new(),
        }
    }

    /// Queued recoveries with their due times, earliest first
    pub fn pending_recoveries(&self) -> Vec<(u64, RecoveryTask)> {
        let mut pending: Vec<_> = self
            .recoveries
            .iter()
            .map(|(at, task)| (at, task.clone()))
            .collect();
        pending.sort_by_key(|(at, _)| *at);
        pending
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Live node list (read-only)
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Get a node by id
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Total pods in the cluster
    pub fn total_pods(&self) -> usize {
        self.nodes.iter().map(Node::pod_count).sum()
    }

    /// Pods lost to recovery overflow since startup
    pub fn dropped_pods_total(&self) -> u64 {
        self.dropped_pods_total
    }

    /// Recent recovery reports, oldest first
    pub fn recovery_history(&self) -> Vec<RecoveryReport> {
        self.history.iter().cloned().collect()
    }

    pub fn stats(&self) -> ClusterStats {
        ClusterStats::from_nodes(&self.nodes, self.dropped_pods_total)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.notifier.latest()
    }

    /// Subscribe to snapshots published from now on
    pub fn subscribe(&self) -> SnapshotReceiver {
        self.notifier.subscribe()
    }

    /// Check the structural invariants of the cluster
    ///
    /// Ready nodes are within capacity, node ids are unique, and no pod is
    /// held by two nodes.
    pub fn invariants_hold(&self) -> bool {
        let within_capacity = self
            .nodes
            .iter()
            .filter(|n| n.is_ready())
            .all(|n| n.pod_count() <= n.capacity);

        let mut node_ids = HashSet::new();
        let unique_nodes = self.nodes.iter().all(|n| node_ids.insert(&n.id));

        let mut pod_ids = HashSet::new();
        let unique_pods = self
            .nodes
            .iter()
            .flat_map(|n| n.pods.iter())
            .all(|p| pod_ids.insert(&p.id));

        within_capacity && unique_nodes && unique_pods
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn position(&self, id: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| &n.id == id)
    }

    fn insert_node(&mut self, name: String) -> NodeId {
        let id = NodeId::from_sequence(self.next_node_seq);
        self.next_node_seq += 1;
        self.nodes
            .push(Node::new(id.clone(), name, self.config.pod_capacity));
        id
    }

    fn capture(&self) -> Snapshot {
        Snapshot::capture(
            self.version,
            self.now_ms(),
            &self.nodes,
            self.dropped_pods_total,
        )
    }

    fn publish(&mut self) {
        debug_assert!(self.invariants_hold());
        self.version += 1;
        let snapshot = self.capture();
        self.notifier.publish(snapshot);
    }
}

impl Default for ClusterStore {
    fn default() -> Self {
        Self::new(ClusterConfig::default())
    }
}
