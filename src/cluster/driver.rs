//! Clock driver - runs the virtual clock in real time
//!
//! The driver runs as a background task next to the API server and:
//! - Ticks at a fixed resolution
//! - Advances the cluster's virtual clock by the real time elapsed
//! - Thereby fires crash recoveries once their delay has passed

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::handle::ClusterHandle;

/// Configuration for the clock driver
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Tick resolution (milliseconds)
    pub tick_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { tick_ms: 100 }
    }
}

/// Converts real time into whole virtual milliseconds
///
/// Only the milliseconds handed out are consumed; the sub-millisecond
/// remainder carries into the next tick so the virtual clock keeps pace
/// with real time.
struct ElapsedMillis {
    last: Instant,
}

impl ElapsedMillis {
    fn new(start: Instant) -> Self {
        Self { last: start }
    }

    fn take(&mut self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.last).as_millis() as u64;
        self.last += Duration::from_millis(elapsed);
        elapsed
    }
}

/// Spawn the clock driver as a background task
///
/// Send on (or drop) the returned sender to stop it.
pub fn spawn_clock_driver(cluster: ClusterHandle, config: DriverConfig) -> watch::Sender<()> {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(());

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(config.tick_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut elapsed_ms = ElapsedMillis::new(Instant::now());

        info!("Clock driver started, ticking every {}ms", config.tick_ms);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let elapsed = elapsed_ms.take(Instant::now());
                    if elapsed == 0 {
                        continue;
                    }

                    let outcomes = cluster.advance(elapsed).await;
                    if !outcomes.is_empty() {
                        debug!("Clock driver fired {} recovery task(s)", outcomes.len());
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("Clock driver shutting down");
                    break;
                }
            }
        }
    });

    shutdown_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::node::NodeId;
    use crate::cluster::store::ClusterConfig;

    #[test]
    fn test_driver_config_default() {
        let config = DriverConfig::default();
        assert_eq!(config.tick_ms, 100);
    }

    #[tokio::test]
    async fn test_elapsed_carries_sub_millisecond_remainder() {
        let start = Instant::now();
        let mut elapsed_ms = ElapsedMillis::new(start);

        assert_eq!(elapsed_ms.take(start + Duration::from_micros(1500)), 1);
        assert_eq!(elapsed_ms.take(start + Duration::from_micros(1900)), 0);
        assert_eq!(elapsed_ms.take(start + Duration::from_micros(3000)), 2);

        // 1000 ticks of 1.5ms add up to 1500 virtual ms, not 1000
        let mut total = 0;
        for i in 1..=1000u64 {
            total += elapsed_ms.take(start + Duration::from_micros(3000 + i * 1500));
        }
        assert_eq!(total, 1500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_fires_recovery_after_delay() {
        let cluster = ClusterHandle::new(ClusterConfig::default());
        cluster.add_pod(None).await.unwrap();
        cluster.crash_node(&NodeId::from("node-1")).await;

        let shutdown = spawn_clock_driver(cluster.clone(), DriverConfig { tick_ms: 50 });

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(cluster.snapshot().await.node("node-1").unwrap().pod_count(), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let snapshot = cluster.snapshot().await;
        assert_eq!(snapshot.node("node-1").unwrap().pod_count(), 0);
        assert_eq!(snapshot.node("node-2").unwrap().pod_count(), 1);

        let _ = shutdown.send(());
    }
}
