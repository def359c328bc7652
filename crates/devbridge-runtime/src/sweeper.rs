//! Periodic eviction of stale sessions.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::debug;

use crate::registry::SessionRegistry;

/// Runs [`SessionRegistry::sweep_expired`] on a fixed interval.
pub struct SessionSweeper {
    /// The registry to sweep.
    registry: Arc<SessionRegistry>,
    /// Shutdown signal receiver.
    shutdown: watch::Receiver<bool>,
}

impl SessionSweeper {
    /// Creates a new sweeper.
    pub fn new(registry: Arc<SessionRegistry>, shutdown: watch::Receiver<bool>) -> Self {
        Self { registry, shutdown }
    }

    /// Run the sweep loop until shutdown signal.
    pub async fn run(&mut self) {
        let sweep_interval = self.registry.config().sweep_interval;
        let mut ticker = interval(sweep_interval);

        debug!(
            sweep_interval_ms = sweep_interval.as_millis() as u64,
            "starting session sweeper"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.registry.sweep_expired().await;
                    if !evicted.is_empty() {
                        debug!(count = evicted.len(), ids = ?evicted, "swept expired sessions");
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        debug!("sweeper received shutdown signal");
                        break;
                    }
                }
            }
        }

        debug!("session sweeper stopped");
    }
}
