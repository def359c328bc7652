//! Session registry: supervises many command runners under a capacity limit.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use devbridge_pty::{NativePtySpawner, PtySpawner};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{RegistryConfig, RunnerConfig};
use crate::error::{Result, SessionError};
use crate::event::RegistryEvent;
use crate::runner::{CommandRunner, RunnerState};
use crate::scrub::scrub_transcript;

/// Registry-level status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Connecting or connected.
    Running,
    /// Stopped by a caller or exited cleanly.
    Stopped,
    /// Failed to start or exited abnormally.
    Errored,
}

/// Snapshot of a registered session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionDescriptor {
    /// Caller-chosen unique ID.
    pub id: String,
    /// Command that was spawned.
    pub command: String,
    /// Command arguments.
    pub args: Vec<String>,
    /// When the session was started.
    pub started_at: DateTime<Utc>,
    /// Current status.
    pub status: SessionStatus,
    /// Free-form caller metadata.
    pub metadata: HashMap<String, serde_json::Value>,
}

struct SessionEntry {
    descriptor: SessionDescriptor,
    runner: Arc<CommandRunner>,
    // Monotonic start time, used for retention.
    started: Instant,
}

type SessionMap = Arc<RwLock<HashMap<String, SessionEntry>>>;

/// Supervises interactive sessions keyed by ID.
pub struct SessionRegistry {
    /// Configuration.
    config: RegistryConfig,
    /// Spawner used for every runner.
    spawner: Arc<dyn PtySpawner>,
    /// Sessions keyed by ID.
    sessions: SessionMap,
    /// Event broadcast channel.
    event_tx: broadcast::Sender<RegistryEvent>,
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Creates a registry that spawns real pseudo-terminals.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_spawner(config, Arc::new(NativePtySpawner::new()))
    }

    /// Creates a registry with a provided spawner.
    pub fn with_spawner(config: RegistryConfig, spawner: Arc<dyn PtySpawner>) -> Self {
        let (event_tx, _) = broadcast::channel(256);

        Self {
            config,
            spawner,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Subscribe to registry events.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_tx.subscribe()
    }

    /// Registers a session and starts it in the background.
    ///
    /// The returned descriptor is `Running` while the session connects. A
    /// failed start flips it to `Errored` but keeps it registered until the
    /// sweep evicts it.
    ///
    /// # Errors
    ///
    /// - `SessionError::Configuration` if the command is empty.
    /// - `SessionError::DuplicateId` if the ID is registered, whatever its status.
    /// - `SessionError::CapacityExceeded` if the running-session limit is reached.
    pub async fn start_process(
        &self,
        id: &str,
        command: &str,
        args: Vec<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<SessionDescriptor> {
        let runner = CommandRunner::new(command, args.clone(), self.config.runner.clone(), Arc::clone(&self.spawner))?
            .with_label(id);
        let runner = Arc::new(runner);

        let descriptor = SessionDescriptor {
            id: id.to_string(),
            command: command.to_string(),
            args,
            started_at: Utc::now(),
            status: SessionStatus::Running,
            metadata,
        };

        {
            let mut sessions = self.sessions.write().await;

            if sessions.contains_key(id) {
                return Err(SessionError::DuplicateId(id.to_string()));
            }

            let running = sessions
                .values()
                .filter(|e| e.descriptor.status == SessionStatus::Running)
                .count();
            if running >= self.config.max_processes {
                return Err(SessionError::CapacityExceeded(self.config.max_processes));
            }

            sessions.insert(
                id.to_string(),
                SessionEntry {
                    descriptor: descriptor.clone(),
                    runner: Arc::clone(&runner),
                    started: Instant::now(),
                },
            );
        }

        info!(session_id = %id, command = %command, args = ?descriptor.args, "session registered");
        self.emit_event(RegistryEvent::SessionStarted { id: id.to_string() });

        tokio::spawn(supervise(
            Arc::clone(&self.sessions),
            self.event_tx.clone(),
            id.to_string(),
            runner,
        ));

        Ok(descriptor)
    }

    /// Stops a session and marks it `Stopped`. Returns false if the ID is unknown.
    pub async fn stop_process(&self, id: &str) -> bool {
        let (runner, was_running) = {
            let mut sessions = self.sessions.write().await;
            let Some(entry) = sessions.get_mut(id) else {
                return false;
            };
            let was_running = entry.descriptor.status == SessionStatus::Running;
            entry.descriptor.status = SessionStatus::Stopped;
            (Arc::clone(&entry.runner), was_running)
        };

        runner.stop().await;

        if was_running {
            info!(session_id = %id, "session stopped");
            self.emit_event(RegistryEvent::SessionStopped { id: id.to_string() });
        }

        true
    }

    /// Runs a command in a session and returns its scrubbed output.
    ///
    /// # Errors
    ///
    /// `SessionError::NotFound`, `SessionError::NotRunning`, or any error from
    /// [`CommandRunner::execute_command`].
    pub async fn execute_process_command(&self, id: &str, command: &str) -> Result<String> {
        let runner = self.running_runner(id).await?;
        debug!(session_id = %id, command = %command, "executing command");
        runner.execute_command(command).await
    }

    /// Writes raw input to a session.
    pub async fn write_to_process(&self, id: &str, input: &str) -> Result<()> {
        let runner = self.running_runner(id).await?;
        runner.write(input)
    }

    /// Waits until a session has finished connecting.
    pub async fn wait_until_connected(&self, id: &str) -> Result<()> {
        let runner = self.runner(id).await?;
        runner.wait_connected().await
    }

    /// Current output buffer of a session.
    pub async fn get_process_output(&self, id: &str) -> Result<String> {
        let runner = self.runner(id).await?;
        Ok(runner.get_output())
    }

    /// Current state of a session's runner.
    pub async fn get_runner_state(&self, id: &str) -> Result<RunnerState> {
        let runner = self.runner(id).await?;
        Ok(runner.state())
    }

    /// Snapshot of one session.
    pub async fn get_process(&self, id: &str) -> Result<SessionDescriptor> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .map(|e| e.descriptor.clone())
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Snapshots of every session, oldest first.
    pub async fn get_all_processes(&self) -> Vec<SessionDescriptor> {
        let sessions = self.sessions.read().await;
        let mut entries: Vec<&SessionEntry> = sessions.values().collect();
        entries.sort_by(|a, b| a.started.cmp(&b.started).then_with(|| a.descriptor.id.cmp(&b.descriptor.id)));
        entries.into_iter().map(|e| e.descriptor.clone()).collect()
    }

    /// Number of registered sessions, whatever their status.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Number of `Running` sessions.
    pub async fn active_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|e| e.descriptor.status == SessionStatus::Running)
            .count()
    }

    /// Runs a command in a throwaway session and returns what it printed
    /// while connecting.
    ///
    /// The session is stopped as soon as it is ready. A process that exits
    /// with code 0 before it looks ready counts as success.
    pub async fn run_command(&self, command: &str, args: Vec<String>, config: Option<RunnerConfig>) -> Result<String> {
        let config = config.unwrap_or_else(|| self.config.runner.clone());
        let prompts = config.prompts.clone();
        let label = format!("run-{}", Uuid::new_v4());

        let runner = CommandRunner::new(command, args, config, Arc::clone(&self.spawner))?.with_label(&label);

        let started = runner.start().await;
        runner.stop().await;
        let transcript = runner.connect_transcript();

        match started {
            Ok(()) | Err(SessionError::ConnectionTimeout { exit_code: Some(0) }) => {
                debug!(session_id = %label, command = %command, bytes = transcript.len(), "one-shot command finished");
                Ok(scrub_transcript(&transcript, &prompts))
            }
            Err(e) => {
                warn!(session_id = %label, command = %command, error = %e, "one-shot command failed");
                Err(e)
            }
        }
    }

    /// Evicts sessions that are not running and older than the retention window.
    ///
    /// Returns the evicted IDs.
    pub async fn sweep_expired(&self) -> Vec<String> {
        let now = Instant::now();
        let retention = self.config.retention;

        let evicted: Vec<String> = {
            let mut sessions = self.sessions.write().await;
            let expired: Vec<String> = sessions
                .iter()
                .filter(|(_, e)| {
                    e.descriptor.status != SessionStatus::Running && now.duration_since(e.started) > retention
                })
                .map(|(id, _)| id.clone())
                .collect();

            for id in &expired {
                sessions.remove(id);
            }
            expired
        };

        for id in &evicted {
            debug!(session_id = %id, "session evicted");
            self.emit_event(RegistryEvent::SessionEvicted { id: id.clone() });
        }

        evicted
    }

    /// Stops every running session and clears the registry.
    pub async fn shutdown(&self) {
        let running: Vec<(String, Arc<CommandRunner>)> = {
            let mut sessions = self.sessions.write().await;
            sessions
                .drain()
                .filter(|(_, e)| e.descriptor.status == SessionStatus::Running)
                .map(|(id, e)| (id, e.runner))
                .collect()
        };

        info!(count = running.len(), "shutting down sessions");

        futures::future::join_all(running.iter().map(|(_, runner)| runner.stop())).await;

        for (id, _) in running {
            self.emit_event(RegistryEvent::SessionStopped { id });
        }
    }

    async fn runner(&self, id: &str) -> Result<Arc<CommandRunner>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .map(|e| Arc::clone(&e.runner))
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    async fn running_runner(&self, id: &str) -> Result<Arc<CommandRunner>> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(id).ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        if entry.descriptor.status != SessionStatus::Running || !entry.runner.is_running() {
            return Err(SessionError::NotRunning(id.to_string()));
        }
        Ok(Arc::clone(&entry.runner))
    }

    fn emit_event(&self, event: RegistryEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.event_tx.send(event);
    }
}

/// Drives a session's start and records how it ends.
async fn supervise(
    sessions: SessionMap,
    event_tx: broadcast::Sender<RegistryEvent>,
    id: String,
    runner: Arc<CommandRunner>,
) {
    let outcome = match runner.start().await {
        Ok(()) => {
            let _ = event_tx.send(RegistryEvent::SessionConnected { id: id.clone() });
            match runner.wait_terminated().await {
                RunnerState::Errored => Err("process exited abnormally".to_string()),
                _ => Ok(()),
            }
        }
        Err(e) => Err(e.to_string()),
    };

    let mut sessions = sessions.write().await;
    let Some(entry) = sessions.get_mut(&id) else {
        return;
    };
    // Stopped by a caller, or the ID now belongs to a newer session.
    if !Arc::ptr_eq(&entry.runner, &runner) || entry.descriptor.status != SessionStatus::Running {
        return;
    }

    match outcome {
        Ok(()) => {
            entry.descriptor.status = SessionStatus::Stopped;
            info!(session_id = %id, "session exited");
            let _ = event_tx.send(RegistryEvent::SessionStopped { id });
        }
        Err(error) => {
            entry.descriptor.status = SessionStatus::Errored;
            warn!(session_id = %id, error = %error, "session errored");
            let _ = event_tx.send(RegistryEvent::SessionErrored { id, error });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devbridge_pty::MockPtySpawner;
    use std::time::Duration;

    const PROMPT: &str = "dev@box:~$ ";

    fn spawner() -> MockPtySpawner {
        MockPtySpawner::new()
            .with_banner(PROMPT)
            .with_responder(|line| Some(format!("{line}\r\n{line} done\r\n{PROMPT}")))
    }

    fn registry(spawner: &MockPtySpawner, config: RegistryConfig) -> SessionRegistry {
        SessionRegistry::with_spawner(config, Arc::new(spawner.clone()))
    }

    async fn start(registry: &SessionRegistry, id: &str) -> SessionDescriptor {
        let descriptor = registry.start_process(id, "bash", vec![], HashMap::new()).await.unwrap();
        registry.wait_until_connected(id).await.unwrap();
        settle().await;
        descriptor
    }

    /// Lets every other task run until idle.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_process_registers_running() {
        let spawner = spawner();
        let registry = registry(&spawner, RegistryConfig::default());
        let mut metadata = HashMap::new();
        metadata.insert("tool".to_string(), serde_json::json!("npm"));

        let descriptor = registry
            .start_process("web", "bash", vec!["-l".to_string()], metadata)
            .await
            .unwrap();

        assert_eq!(descriptor.id, "web");
        assert_eq!(descriptor.status, SessionStatus::Running);
        assert_eq!(descriptor.metadata["tool"], "npm");
        assert_eq!(registry.session_count().await, 1);
        assert_eq!(registry.active_count().await, 1);

        registry.wait_until_connected("web").await.unwrap();
        assert_eq!(registry.get_runner_state("web").await.unwrap(), RunnerState::Connected);
        assert_eq!(spawner.last_terminal().unwrap().request().args, vec!["-l"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_process_rejects_empty_command() {
        let spawner = spawner();
        let registry = registry(&spawner, RegistryConfig::default());

        let result = registry.start_process("x", "", vec![], HashMap::new()).await;

        assert!(matches!(result, Err(SessionError::Configuration(_))));
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_id_leaves_existing_session() {
        let spawner = spawner();
        let registry = registry(&spawner, RegistryConfig::default());
        start(&registry, "a").await;

        let result = registry.start_process("a", "zsh", vec![], HashMap::new()).await;

        assert!(matches!(result, Err(SessionError::DuplicateId(id)) if id == "a"));
        let existing = registry.get_process("a").await.unwrap();
        assert_eq!(existing.command, "bash");
        assert_eq!(existing.status, SessionStatus::Running);
        assert_eq!(spawner.spawn_count(), 1);
        assert_eq!(registry.execute_process_command("a", "ls").await.unwrap(), "ls done");
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_id_applies_to_stopped_sessions() {
        let spawner = spawner();
        let registry = registry(&spawner, RegistryConfig::default());
        start(&registry, "a").await;
        registry.stop_process("a").await;

        let result = registry.start_process("a", "bash", vec![], HashMap::new()).await;
        assert!(matches!(result, Err(SessionError::DuplicateId(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_counts_running_sessions_only() {
        let spawner = spawner();
        let registry = registry(&spawner, RegistryConfig::new().with_max_processes(1));
        start(&registry, "a").await;

        let result = registry.start_process("b", "bash", vec![], HashMap::new()).await;
        assert!(matches!(result, Err(SessionError::CapacityExceeded(1))));
        assert!(matches!(registry.get_process("b").await, Err(SessionError::NotFound(_))));

        registry.stop_process("a").await;
        start(&registry, "b").await;
        assert_eq!(registry.active_count().await, 1);
        assert_eq!(registry.session_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_process_command() {
        let spawner = spawner();
        let registry = registry(&spawner, RegistryConfig::default());
        start(&registry, "a").await;

        let output = registry.execute_process_command("a", "npm test").await.unwrap();

        assert_eq!(output, "npm test done");
        assert_eq!(spawner.last_terminal().unwrap().inputs(), vec!["npm test\n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_on_unknown_session() {
        let spawner = spawner();
        let registry = registry(&spawner, RegistryConfig::default());

        assert!(matches!(registry.execute_process_command("nope", "ls").await, Err(SessionError::NotFound(_))));
        assert!(matches!(registry.write_to_process("nope", "q").await, Err(SessionError::NotFound(_))));
        assert!(matches!(registry.get_process_output("nope").await, Err(SessionError::NotFound(_))));
        assert!(matches!(registry.get_process("nope").await, Err(SessionError::NotFound(_))));
        assert!(!registry.stop_process("nope").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_on_stopped_session() {
        let spawner = spawner();
        let registry = registry(&spawner, RegistryConfig::default());
        start(&registry, "a").await;

        assert!(registry.stop_process("a").await);

        assert_eq!(registry.get_process("a").await.unwrap().status, SessionStatus::Stopped);
        assert!(spawner.last_terminal().unwrap().is_killed());
        assert!(matches!(registry.execute_process_command("a", "ls").await, Err(SessionError::NotRunning(_))));
        assert!(matches!(registry.write_to_process("a", "q").await, Err(SessionError::NotRunning(_))));
        assert!(registry.stop_process("a").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_to_process() {
        let spawner = spawner();
        let registry = registry(&spawner, RegistryConfig::default());
        start(&registry, "a").await;

        registry.write_to_process("a", "\x03").await.unwrap();
        settle().await;

        assert_eq!(spawner.last_terminal().unwrap().inputs(), vec!["\x03"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_process_output() {
        let spawner = MockPtySpawner::new().with_banner(PROMPT);
        let registry = registry(&spawner, RegistryConfig::default());
        start(&registry, "a").await;

        spawner.last_terminal().unwrap().emit("background noise");
        settle().await;

        assert_eq!(registry.get_process_output("a").await.unwrap(), "background noise");
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_marks_errored() {
        let spawner = MockPtySpawner::new().with_exit_on_spawn(127);
        let registry = registry(&spawner, RegistryConfig::default());
        let mut events = registry.subscribe();

        registry.start_process("bad", "nosuchcmd", vec![], HashMap::new()).await.unwrap();
        assert!(registry.wait_until_connected("bad").await.is_err());
        settle().await;

        assert_eq!(registry.get_process("bad").await.unwrap().status, SessionStatus::Errored);
        assert_eq!(registry.active_count().await, 0);

        assert_eq!(events.recv().await.unwrap(), RegistryEvent::SessionStarted { id: "bad".to_string() });
        assert!(events.recv().await.unwrap().is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_flips_status() {
        let spawner = spawner();
        let registry = registry(&spawner, RegistryConfig::default());
        start(&registry, "clean").await;
        let clean = spawner.last_terminal().unwrap();
        start(&registry, "crash").await;
        let crash = spawner.last_terminal().unwrap();

        clean.exit(Some(0));
        crash.exit(Some(139));
        settle().await;

        assert_eq!(registry.get_process("clean").await.unwrap().status, SessionStatus::Stopped);
        assert_eq!(registry.get_process("crash").await.unwrap().status, SessionStatus::Errored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_keeps_stopped_status_after_kill() {
        let spawner = spawner();
        let registry = registry(&spawner, RegistryConfig::default());
        start(&registry, "a").await;

        registry.stop_process("a").await;
        settle().await;

        assert_eq!(registry.get_process("a").await.unwrap().status, SessionStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_all_processes_ordered_by_start() {
        let spawner = spawner();
        let registry = registry(&spawner, RegistryConfig::default());
        for id in ["zeta", "alpha", "mid"] {
            start(&registry, id).await;
            tokio::time::advance(Duration::from_millis(5)).await;
        }

        let ids: Vec<String> = registry.get_all_processes().await.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_terminal_sessions_past_retention() {
        let spawner = spawner();
        let registry = registry(&spawner, RegistryConfig::new().with_retention(Duration::from_secs(60)));
        start(&registry, "old").await;
        start(&registry, "live").await;
        registry.stop_process("old").await;

        assert!(registry.sweep_expired().await.is_empty());

        tokio::time::advance(Duration::from_secs(61)).await;
        let evicted = registry.sweep_expired().await;

        assert_eq!(evicted, vec!["old"]);
        assert!(matches!(registry.get_process("old").await, Err(SessionError::NotFound(_))));
        assert_eq!(registry.get_process("live").await.unwrap().status, SessionStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_command_returns_transcript() {
        let spawner = MockPtySpawner::new().with_banner("v20.11.0\r\n").with_exit_on_spawn(0);
        let registry = registry(&spawner, RegistryConfig::default());

        let output = registry.run_command("node", vec!["--version".to_string()], None).await.unwrap();

        assert_eq!(output, "v20.11.0");
        assert_eq!(registry.session_count().await, 0);
        assert_eq!(spawner.last_terminal().unwrap().request().args, vec!["--version"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_command_stops_ready_session() {
        let spawner = MockPtySpawner::new().with_banner("Welcome\r\n$ ");
        let registry = registry(&spawner, RegistryConfig::default());

        let output = registry.run_command("bash", vec![], None).await.unwrap();

        assert_eq!(output, "Welcome");
        assert!(spawner.last_terminal().unwrap().is_killed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_command_keeps_long_output() {
        let spawner = MockPtySpawner::new();
        let registry = Arc::new(registry(&spawner, RegistryConfig::default()));

        let run = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.run_command("git", vec!["log".to_string()], None).await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;

        let term = spawner.last_terminal().unwrap();
        for i in 0..400 {
            term.emit(format!("line{i}\r\n"));
        }
        term.exit(Some(0));

        let output = run.await.unwrap().unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 400);
        assert_eq!(lines.first(), Some(&"line0"));
        assert_eq!(lines.last(), Some(&"line399"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_command_propagates_failure() {
        let spawner = MockPtySpawner::new().with_banner("fatal: not a git repository\r\n").with_exit_on_spawn(128);
        let registry = registry(&spawner, RegistryConfig::default());

        let result = registry.run_command("git", vec!["status".to_string()], None).await;

        assert!(matches!(result, Err(SessionError::ConnectionTimeout { exit_code: Some(128) })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_command_with_custom_config() {
        let spawner = MockPtySpawner::new().with_banner("compiling...\r\n");
        let registry = registry(&spawner, RegistryConfig::default());
        let config = RunnerConfig::new().with_connection_timeout(Duration::from_millis(200));

        let started = Instant::now();
        let output = registry.run_command("cargo", vec![], Some(config)).await.unwrap();

        assert_eq!(output, "compiling...");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_everything() {
        let spawner = spawner();
        let registry = registry(&spawner, RegistryConfig::default());
        start(&registry, "a").await;
        start(&registry, "b").await;

        registry.shutdown().await;

        assert_eq!(registry.session_count().await, 0);
        for terminal in spawner.terminals() {
            assert!(terminal.is_killed());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_for_lifecycle() {
        let spawner = spawner();
        let registry = registry(&spawner, RegistryConfig::default());
        let mut events = registry.subscribe();

        start(&registry, "a").await;
        registry.stop_process("a").await;

        assert_eq!(events.recv().await.unwrap(), RegistryEvent::SessionStarted { id: "a".to_string() });
        assert_eq!(events.recv().await.unwrap(), RegistryEvent::SessionConnected { id: "a".to_string() });
        assert_eq!(events.recv().await.unwrap(), RegistryEvent::SessionStopped { id: "a".to_string() });
    }
}
