//! Process manager: the registry plus its background sweeper.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::RegistryConfig;
use crate::error::{Result, SessionError};
use crate::registry::SessionRegistry;
use crate::sweeper::SessionSweeper;

/// Owns a [`SessionRegistry`] and the task that sweeps it.
///
/// Dropping a started manager signals the sweeper to exit; sessions are only
/// stopped by [`shutdown`](Self::shutdown).
pub struct ProcessManager {
    registry: Arc<SessionRegistry>,
    sweeper: Option<JoinHandle<()>>,
    // Flipped to true once; the sweeper holds a receiver.
    halt: watch::Sender<bool>,
}

impl ProcessManager {
    /// A manager whose registry spawns native pseudo-terminals.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_registry(SessionRegistry::new(config))
    }

    pub fn with_registry(registry: SessionRegistry) -> Self {
        let (halt, _) = watch::channel(false);
        Self {
            registry: Arc::new(registry),
            sweeper: None,
            halt,
        }
    }

    /// Spawns the sweeper.
    ///
    /// # Errors
    ///
    /// `SessionError::AlreadyStarted` if the sweeper is already running.
    pub async fn start(&mut self) -> Result<()> {
        if self.sweeper.is_some() {
            return Err(SessionError::AlreadyStarted);
        }

        let retention = self.registry.config().retention;
        info!(retention_secs = retention.as_secs(), "starting process manager");

        self.halt.send_replace(false);
        let mut sweeper = SessionSweeper::new(Arc::clone(&self.registry), self.halt.subscribe());
        self.sweeper = Some(tokio::spawn(async move { sweeper.run().await }));

        Ok(())
    }

    /// Halts the sweeper, then stops and unregisters every session.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotStarted` if [`start`](Self::start) was not called.
    /// - `SessionError::Shutdown` if the sweeper task panicked; sessions are
    ///   still stopped.
    pub async fn shutdown(&mut self) -> Result<()> {
        let Some(sweeper) = self.sweeper.take() else {
            return Err(SessionError::NotStarted);
        };

        info!(sessions = self.registry.session_count().await, "shutting down process manager");

        self.halt.send_replace(true);
        let joined = sweeper.await;
        self.registry.shutdown().await;

        debug!("process manager stopped");
        joined.map_err(|e| SessionError::Shutdown(format!("sweeper task panicked: {}", e)))
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Whether the sweeper is running.
    pub fn is_started(&self) -> bool {
        self.sweeper.is_some()
    }
}

impl Drop for ProcessManager {
    fn drop(&mut self) {
        if self.sweeper.is_some() {
            self.halt.send_replace(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RegistryEvent;
    use devbridge_pty::MockPtySpawner;
    use std::collections::HashMap;
    use std::time::Duration;

    fn manager(spawner: &MockPtySpawner, config: RegistryConfig) -> ProcessManager {
        ProcessManager::with_registry(SessionRegistry::with_spawner(config, Arc::new(spawner.clone())))
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_start_stop() {
        let spawner = MockPtySpawner::new().with_banner("$ ");
        let mut manager = manager(&spawner, RegistryConfig::default());
        assert!(!manager.is_started());

        manager.start().await.unwrap();
        assert!(manager.is_started());

        manager.shutdown().await.unwrap();
        assert!(!manager.is_started());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_double_start() {
        let spawner = MockPtySpawner::new();
        let mut manager = manager(&spawner, RegistryConfig::default());

        manager.start().await.unwrap();
        assert!(matches!(manager.start().await, Err(SessionError::AlreadyStarted)));

        manager.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_restart_sweeps_again() {
        let spawner = MockPtySpawner::new().with_banner("$ ");
        let config = RegistryConfig::new()
            .with_sweep_interval(Duration::from_secs(1))
            .with_retention(Duration::from_secs(2));
        let mut manager = manager(&spawner, config);
        manager.start().await.unwrap();
        manager.shutdown().await.unwrap();
        manager.start().await.unwrap();

        let registry = manager.registry();
        registry.start_process("a", "bash", vec![], HashMap::new()).await.unwrap();
        registry.wait_until_connected("a").await.unwrap();
        registry.stop_process("a").await;

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(registry.session_count().await, 0);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_shutdown_not_started() {
        let spawner = MockPtySpawner::new();
        let mut manager = manager(&spawner, RegistryConfig::default());

        assert!(matches!(manager.shutdown().await, Err(SessionError::NotStarted)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_shutdown_stops_sessions() {
        let spawner = MockPtySpawner::new().with_banner("$ ");
        let mut manager = manager(&spawner, RegistryConfig::default());
        manager.start().await.unwrap();

        let registry = manager.registry();
        registry.start_process("a", "bash", vec![], HashMap::new()).await.unwrap();
        registry.wait_until_connected("a").await.unwrap();

        manager.shutdown().await.unwrap();

        assert_eq!(registry.session_count().await, 0);
        assert!(spawner.last_terminal().unwrap().is_killed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_sweeps_in_background() {
        let spawner = MockPtySpawner::new().with_banner("$ ");
        let config = RegistryConfig::new()
            .with_sweep_interval(Duration::from_secs(1))
            .with_retention(Duration::from_secs(5));
        let mut manager = manager(&spawner, config);
        let registry = manager.registry();
        let mut events = registry.subscribe();
        manager.start().await.unwrap();

        registry.start_process("a", "bash", vec![], HashMap::new()).await.unwrap();
        registry.wait_until_connected("a").await.unwrap();
        registry.stop_process("a").await;

        tokio::time::sleep(Duration::from_secs(7)).await;

        assert!(matches!(registry.get_process("a").await, Err(SessionError::NotFound(_))));
        let mut evicted = false;
        while let Ok(event) = events.try_recv() {
            evicted |= event == RegistryEvent::SessionEvicted { id: "a".to_string() };
        }
        assert!(evicted);

        manager.shutdown().await.unwrap();
    }
}
