//! # KubeQuest Cluster Simulation
//!
//! A miniature, in-memory Kubernetes for learners. The port analogy:
//!
//! - **Cluster**: the shipping port
//! - **Node**: a cargo ship with a fixed number of container slots
//! - **Pod**: a shipping container placed on a ship
//!
//! ## Behaviour
//!
//! 1. **Scheduling**: first-fit over the ordered node list; no spare slot
//!    anywhere means the cluster is full.
//! 2. **Failure**: crashing a node marks it NotReady and its pods Crashed.
//! 3. **Self-healing**: after a delay the crashed node is drained and its
//!    pods are re-placed first-fit. Pods that fit nowhere are dropped.
//! 4. **Notification**: every mutation publishes one immutable snapshot.
//!
//! ## Architecture
//!
//! ```text
//!   CLI / HTTP API ──► ClusterHandle ──► ClusterStore ──► ChangeNotifier ──► watchers
//!                           ▲                 │
//!                      clock driver      TimerQueue (recoveries)
//! ```

pub mod api;
pub mod driver;
pub mod handle;
pub mod healing;
pub mod node;
pub mod notifier;
pub mod scheduler;
pub mod store;
pub mod timer;

pub use api::{create_router, ApiState};
pub use driver::{spawn_clock_driver, DriverConfig};
pub use handle::ClusterHandle;
pub use healing::{Placement, RecoveryOutcome, RecoveryReport, RecoveryTask};
pub use node::{Node, NodeId, NodeStatus, Pod, PodId, PodStatus};
pub use notifier::{ChangeNotifier, ClusterHealth, ClusterStats, Snapshot, SnapshotReceiver};
pub use scheduler::{first_fit, ClusterFull};
pub use store::{ClusterConfig, ClusterStore, StoreError};

/// Nodes in a freshly bootstrapped cluster
pub const INITIAL_NODE_COUNT: usize = 2;

/// Pod slots per node
pub const MAX_PODS_PER_NODE: usize = 4;

/// Delay between a node crash and its recovery (milliseconds)
pub const RECOVERY_DELAY_MS: u64 = 2000;

/// Default port for the simulator API
pub const DEFAULT_PORT: u16 = 8080;
