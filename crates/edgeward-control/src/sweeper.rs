//! Background task demoting expired tunnels

use crate::tunnel::TunnelCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Periodic keep-alive sweep over the tunnel coordinator
///
/// An active tunnel that misses its deadline stays Active until the next
/// tick, so the sweep interval bounds how stale a status can be.
pub struct TunnelSweeper {
    coordinator: Arc<TunnelCoordinator>,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl TunnelSweeper {
    pub fn new(coordinator: Arc<TunnelCoordinator>, interval: Duration) -> Self {
        Self {
            coordinator,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle used to stop the loop; signal it with `notify_one`
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run until shutdown is signalled
    pub async fn run(&self) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Tunnel sweeper started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Tunnel sweeper received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {
                    let demoted = self.coordinator.sweep();
                    if !demoted.is_empty() {
                        debug!(count = demoted.len(), "Demoted expired tunnels");
                    }
                }
            }
        }

        info!("Tunnel sweeper stopped");
    }

    /// Spawn the loop onto the current runtime
    pub fn spawn(self) -> (Arc<Notify>, JoinHandle<()>) {
        let shutdown = self.shutdown_handle();
        let handle = tokio::spawn(async move { self.run().await });
        (shutdown, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortRange;
    use crate::jobs::EdgeJobDispatcher;
    use crate::port_allocator::RangePortAllocator;
    use crate::tunnel::KnownEnvironments;
    use edgeward_auth::CredentialIssuer;
    use edgeward_proto::{EnvironmentId, TunnelStatus};

    struct Everyone;

    impl KnownEnvironments for Everyone {
        fn contains(&self, _environment_id: EnvironmentId) -> bool {
            true
        }
    }

    fn coordinator(keep_alive: Duration) -> Arc<TunnelCoordinator> {
        Arc::new(TunnelCoordinator::new(
            Arc::new(Everyone),
            Arc::new(RangePortAllocator::new(PortRange::range(9000, 9009))),
            Arc::new(CredentialIssuer::new(b"secret", chrono::Duration::hours(1))),
            Arc::new(EdgeJobDispatcher::new()),
            keep_alive,
        ))
    }

    #[tokio::test]
    async fn test_sweeper_demotes_expired_tunnel() {
        let coordinator = coordinator(Duration::ZERO);
        coordinator.set_active(EnvironmentId(1)).unwrap();

        let sweeper = TunnelSweeper::new(coordinator.clone(), Duration::from_millis(10));
        let (shutdown, handle) = sweeper.spawn();

        let demoted = tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.status(EnvironmentId(1)).unwrap() != TunnelStatus::Idle {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(demoted.is_ok());

        shutdown.notify_one();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick() {
        let sweeper = TunnelSweeper::new(coordinator(Duration::from_secs(60)), Duration::from_secs(3600));
        let shutdown = sweeper.shutdown_handle();
        shutdown.notify_one();

        tokio::time::timeout(Duration::from_secs(5), sweeper.run())
            .await
            .expect("sweeper should stop on shutdown");
    }
}
