//! Shared handle to the cluster store
//!
//! Wraps the store in an async mutex so the API server, the clock driver and
//! the CLI simulator all go through the same single mutation path. Every
//! command returns the snapshot current after the command ran.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::healing::{RecoveryOutcome, RecoveryReport, RecoveryTask};
use super::node::NodeId;
use super::notifier::{Snapshot, SnapshotReceiver};
use super::store::{ClusterConfig, ClusterStore, StoreError};

/// Cloneable handle onto one cluster store
#[derive(Clone)]
pub struct ClusterHandle {
    store: Arc<Mutex<ClusterStore>>,
}

impl ClusterHandle {
    /// Bootstrap a new cluster
    pub fn new(config: ClusterConfig) -> Self {
        Self::from_store(ClusterStore::new(config))
    }

    /// Wrap an existing store
    pub fn from_store(store: ClusterStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Add a node
    pub async fn add_node(&self, name: Option<String>) -> Arc<Snapshot> {
        let mut store = self.store.lock().await;
        store.add_node(name);
        store.snapshot()
    }

    /// Remove a node and its pods
    pub async fn remove_node(&self, id: &NodeId) -> Arc<Snapshot> {
        let mut store = self.store.lock().await;
        store.remove_node(id);
        store.snapshot()
    }

    /// Add a pod, or report that the cluster is full
    pub async fn add_pod(&self, name: Option<String>) -> Result<Arc<Snapshot>, StoreError> {
        let mut store = self.store.lock().await;
        match name {
            Some(name) => store.add_named_pod(name)?,
            None => store.add_pod()?,
        };
        Ok(store.snapshot())
    }

    /// Crash a node; its recovery fires after the configured delay
    ///
    /// Crashing a node that is already down changes nothing and returns the
    /// current snapshot.
    pub async fn crash_node(&self, id: &NodeId) -> Arc<Snapshot> {
        let mut store = self.store.lock().await;
        store.crash_node(id);
        store.snapshot()
    }

    /// Advance the virtual clock
    pub async fn advance(&self, delta_ms: u64) -> Vec<RecoveryOutcome> {
        self.store.lock().await.advance(delta_ms)
    }

    /// Latest snapshot
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.store.lock().await.snapshot()
    }

    /// Latest snapshot together with a subscription to every later one
    ///
    /// Taken under one lock so no snapshot falls between the two.
    pub async fn watch(&self) -> (Arc<Snapshot>, SnapshotReceiver) {
        let store = self.store.lock().await;
        (store.snapshot(), store.subscribe())
    }

    /// Recent recovery reports
    pub async fn recovery_history(&self) -> Vec<RecoveryReport> {
        self.store.lock().await.recovery_history()
    }

    /// Queued recoveries
    pub async fn pending_recoveries(&self) -> Vec<(u64, RecoveryTask)> {
        self.store.lock().await.pending_recoveries()
    }
}

impl Default for ClusterHandle {
    fn default() -> Self {
        Self::new(ClusterConfig::default())
    }
}
