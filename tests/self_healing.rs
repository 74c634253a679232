//! Integration tests for scheduling and self-healing
//!
//! Drives the cluster store through its public API on the virtual clock, so
//! every recovery fires exactly when the test says.

use std::collections::HashSet;

use kubequest::cluster::{
    ClusterConfig, ClusterHandle, ClusterHealth, ClusterStore, NodeId, NodeStatus, PodId,
    PodStatus, RecoveryOutcome, StoreError,
};

fn node(n: u64) -> NodeId {
    NodeId::from_sequence(n)
}

fn pod_ids(store: &ClusterStore, id: &NodeId) -> Vec<PodId> {
    store
        .node(id)
        .map(|n| n.pods.iter().map(|p| p.id.clone()).collect())
        .unwrap_or_default()
}

fn fill(store: &mut ClusterStore, pods: usize) {
    for _ in 0..pods {
        store.add_pod().unwrap();
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_eight_pods_fill_two_ships_then_full() {
    let mut store = ClusterStore::new(ClusterConfig::default());

    fill(&mut store, 8);
    assert_eq!(store.node(&node(1)).unwrap().pod_count(), 4);
    assert_eq!(store.node(&node(2)).unwrap().pod_count(), 4);

    let before = store.nodes().to_vec();
    let result = store.add_pod();

    assert!(matches!(result, Err(StoreError::ClusterFull(_))));
    assert_eq!(store.nodes(), before.as_slice());
}

#[test]
fn test_crash_then_heal_onto_empty_ship() {
    let mut store = ClusterStore::new(ClusterConfig::default());
    fill(&mut store, 3);
    let moved = pod_ids(&store, &node(1));

    store.crash_node(&node(1));

    let crashed = store.node(&node(1)).unwrap();
    assert_eq!(crashed.status, NodeStatus::NotReady);
    assert_eq!(crashed.pod_count(), 3);
    assert!(crashed.pods.iter().all(|p| p.status == PodStatus::Crashed));

    store.advance(1999);
    assert_eq!(store.node(&node(1)).unwrap().pod_count(), 3);

    store.advance(1);
    assert!(store.node(&node(1)).unwrap().pods.is_empty());
    assert_eq!(pod_ids(&store, &node(2)), moved);
    assert!(store
        .node(&node(2))
        .unwrap()
        .pods
        .iter()
        .all(|p| p.status == PodStatus::Running));
}

#[test]
fn test_crash_full_ship_drops_overflow() {
    let mut store = ClusterStore::new(ClusterConfig::default());
    fill(&mut store, 7);
    let on_a = pod_ids(&store, &node(1));

    store.crash_node(&node(1));
    let outcomes = store.run_pending();

    let report = outcomes[0].report().unwrap();
    assert_eq!(report.placements.len(), 1);
    assert_eq!(report.placements[0].pod_id, on_a[0]);
    assert_eq!(report.dropped_ids(), on_a[1..].to_vec());
    assert!(report.dropped.iter().all(|p| p.status == PodStatus::Pending));

    assert!(store.node(&node(1)).unwrap().pods.is_empty());
    assert_eq!(store.node(&node(2)).unwrap().pod_count(), 4);
    assert_eq!(store.dropped_pods_total(), 3);
    assert_eq!(store.stats().dropped_pods, 3);
}

#[test]
fn test_remove_before_recovery_is_noop() {
    let mut store = ClusterStore::new(ClusterConfig::default());
    fill(&mut store, 2);

    store.crash_node(&node(1));
    store.advance(500);
    assert!(store.remove_node(&node(1)));
    let version = store.snapshot().version;

    let outcomes = store.advance(5000);

    assert!(matches!(
        outcomes.as_slice(),
        [RecoveryOutcome::Skipped { node_id }] if node_id == &node(1)
    ));
    assert!(store.node(&node(1)).is_none());
    assert_eq!(store.nodes().len(), 1);
    assert_eq!(store.snapshot().version, version);
}

// ============================================================================
// Properties
// ============================================================================

/// Tiny deterministic generator so runs are reproducible without extra crates
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

fn random_walk(seed: u64, steps: usize) -> ClusterStore {
    let mut rng = Lcg(seed);
    let mut store = ClusterStore::new(ClusterConfig::default());

    for _ in 0..steps {
        let target = node(rng.next(6) + 1);
        match rng.next(6) {
            0 => {
                store.add_node(None);
            }
            1 => {
                store.remove_node(&target);
            }
            2 => {
                store.crash_node(&target);
            }
            3 => {
                store.advance(rng.next(3000));
            }
            _ => {
                let _ = store.add_pod();
            }
        }
        assert!(store.invariants_hold(), "invariants broken (seed {})", seed);
    }

    store
}

#[test]
fn test_ready_nodes_never_exceed_capacity() {
    for seed in 0..20 {
        let store = random_walk(seed, 200);
        for n in store.nodes().iter().filter(|n| n.status == NodeStatus::Ready) {
            assert!(n.pod_count() <= n.capacity);
        }
    }
}

#[test]
fn test_pod_ids_unique_across_cluster() {
    let store = random_walk(7, 300);
    let ids: Vec<_> = store
        .nodes()
        .iter()
        .flat_map(|n| n.pods.iter().map(|p| p.id.clone()))
        .collect();
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
}

#[test]
fn test_same_operations_same_cluster() {
    let a = random_walk(42, 150);
    let b = random_walk(42, 150);
    assert_eq!(a.nodes(), b.nodes());
    assert_eq!(a.dropped_pods_total(), b.dropped_pods_total());
}

#[test]
fn test_recovery_conserves_pods() {
    let mut store = ClusterStore::new(ClusterConfig::default());
    store.add_node(None);
    fill(&mut store, 10);
    store.crash_node(&node(2));
    let total_before = store.total_pods();

    let outcomes = store.run_pending();
    let report = outcomes[0].report().unwrap();

    assert_eq!(
        store.total_pods() + report.dropped.len(),
        total_before,
        "every pod is either placed or reported dropped"
    );
}

#[test]
fn test_crash_is_idempotent() {
    let mut store = ClusterStore::new(ClusterConfig::default());
    fill(&mut store, 2);

    assert!(store.crash_node(&node(1)).is_some());
    assert!(store.crash_node(&node(1)).is_none());
    assert_eq!(store.pending_recoveries().len(), 1);

    let outcomes = store.run_pending();
    assert_eq!(outcomes.len(), 1);
}

#[test]
fn test_recovery_uses_live_cluster() {
    let mut store = ClusterStore::new(ClusterConfig::default());
    fill(&mut store, 2);
    store.crash_node(&node(1));

    // Cluster changes between crash and recovery
    let late = store.add_node(Some("late-ship".to_string()));
    fill(&mut store, 4);

    store.run_pending();

    assert_eq!(store.node(&node(2)).unwrap().pod_count(), 4);
    assert_eq!(store.node(&late).unwrap().pod_count(), 2);
}

// ============================================================================
// Notifications
// ============================================================================

#[test]
fn test_one_snapshot_per_mutation() {
    let mut store = ClusterStore::new(ClusterConfig::default());
    let mut rx = store.subscribe();

    store.add_pod().unwrap();
    store.crash_node(&node(1));
    store.crash_node(&node(1));
    store.remove_node(&node(9));
    store.run_pending();

    let versions: Vec<u64> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|s| s.version)
        .collect();
    assert_eq!(versions, vec![1, 2, 3]);

    let last = store.snapshot();
    assert_eq!(last.stats.health, ClusterHealth::Degraded);
    assert_eq!(last.node("node-2").unwrap().pod_count(), 1);
}

#[test]
fn test_handle_serializes_mutations() {
    tokio_test::block_on(async {
        let cluster = ClusterHandle::default();
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cluster = cluster.clone();
                async move { cluster.add_pod(None).await }
            })
            .collect();

        let results = futures::future::join_all(tasks).await;

        assert!(results.iter().all(|r| r.is_ok()));
        let snapshot = cluster.snapshot().await;
        assert_eq!(snapshot.version, 8);
        assert_eq!(snapshot.stats.free_slots, 0);
        assert!(cluster.add_pod(None).await.is_err());
    });
}
