//! Failure detection and self-healing
//!
//! Crashing a node is a two-step protocol:
//!
//! 1. The node flips to `NotReady` at once. Its pods stay attached (marked
//!    `Crashed`) so the renderer can show the failure.
//! 2. After a fixed delay a [`RecoveryTask`] fires. It carries only the node
//!    id and re-resolves it against the live cluster:
//!    - node gone (removed meanwhile): nothing happens
//!    - otherwise the node is drained and every pod it held is re-placed
//!      first-fit, one after another, so a node filled by one pod is skipped
//!      for the next. Pods that fit nowhere are dropped and reported.
//!
//! The drained node stays `NotReady` and empty; there is no way back to
//! `Ready` for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::node::{Node, NodeId, Pod, PodId, PodStatus};
use super::scheduler::first_fit_index;

/// Deferred recovery for one crashed node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryTask {
    /// Node to drain, resolved again when the task fires
    #[serde(rename = "nodeId")]
    pub node_id: NodeId,

    /// Virtual time of the crash
    #[serde(rename = "crashedAtMs")]
    pub crashed_at_ms: u64,
}

/// A pod that found a new home during recovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    #[serde(rename = "podId")]
    pub pod_id: PodId,

    #[serde(rename = "nodeId")]
    pub node_id: NodeId,
}

/// What a completed recovery did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// The crashed node that was drained
    #[serde(rename = "nodeId")]
    pub node_id: NodeId,

    /// Virtual time the task fired
    #[serde(rename = "firedAtMs")]
    pub fired_at_ms: u64,

    /// Wall-clock time the task fired
    #[serde(rename = "completedAt")]
    pub completed_at: DateTime<Utc>,

    /// Pods re-placed, in the order they were handled
    #[serde(default)]
    pub placements: Vec<Placement>,

    /// Pods lost because no ready node had room
    #[serde(default)]
    pub dropped: Vec<Pod>,
}

impl RecoveryReport {
    /// True if some pods could not be re-placed
    pub fn has_overflow(&self) -> bool {
        !self.dropped.is_empty()
    }

    /// Ids of the dropped pods
    pub fn dropped_ids(&self) -> Vec<PodId> {
        self.dropped.iter().map(|p| p.id.clone()).collect()
    }
}

/// Result of firing a recovery task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome")]
pub enum RecoveryOutcome {
    /// The node no longer exists; nothing changed
    Skipped {
        #[serde(rename = "nodeId")]
        node_id: NodeId,
    },
    /// The node was drained
    Completed(RecoveryReport),
}

impl RecoveryOutcome {
    /// Did this firing change the cluster
    pub fn mutated(&self) -> bool {
        matches!(self, RecoveryOutcome::Completed(_))
    }

    pub fn report(&self) -> Option<&RecoveryReport> {
        match self {
            RecoveryOutcome::Completed(report) => Some(report),
            RecoveryOutcome::Skipped { .. } => None,
        }
    }
}

/// Drain the task's node and re-place its pods across `nodes`
///
/// Operates on the cluster as it is now, not as it was at crash time.
pub fn recover(nodes: &mut [Node], task: &RecoveryTask, fired_at_ms: u64) -> RecoveryOutcome {
    let Some(crashed) = nodes.iter_mut().find(|n| n.id == task.node_id) else {
        debug!(
            "Recovery for {} skipped: node no longer exists",
            task.node_id
        );
        return RecoveryOutcome::Skipped {
            node_id: task.node_id.clone(),
        };
    };

    // Drained regardless of how many pods find a new home
    let reschedule: Vec<Pod> = std::mem::take(&mut crashed.pods)
        .into_iter()
        .map(|pod| pod.with_status(PodStatus::Pending))
        .collect();

    let mut placements = Vec::with_capacity(reschedule.len());
    let mut dropped = Vec::new();

    for pod in reschedule {
        match first_fit_index(nodes) {
            Ok(idx) => {
                let target = &mut nodes[idx];
                debug!("Rescheduling {} from {} to {}", pod.id, task.node_id, target.id);
                placements.push(Placement {
                    pod_id: pod.id.clone(),
                    node_id: target.id.clone(),
                });
                target.pods.push(pod.with_status(PodStatus::Running));
            }
            Err(full) => {
                warn!(
                    "Cluster capacity exceeded during rescheduling: dropping {} from {} ({})",
                    pod.id, task.node_id, full
                );
                dropped.push(pod);
            }
        }
    }

    info!(
        "Recovery for {} complete: {} pod(s) rescheduled, {} dropped",
        task.node_id,
        placements.len(),
        dropped.len()
    );

    RecoveryOutcome::Completed(RecoveryReport {
        node_id: task.node_id.clone(),
        fired_at_ms,
        completed_at: Utc::now(),
        placements,
        dropped,
    })
}
