//! Runner and registry configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use devbridge_pty::{TerminalSize, DEFAULT_TERM};

use crate::prompt::PromptPatterns;

/// What a command does when no prompt appears before its timeout.
///
/// The default, [`TimeoutPolicy::Resolve`], delivers whatever output was
/// buffered as a successful result. Callers cannot tell a timed-out command
/// from a completed one under this policy; choose [`TimeoutPolicy::Fail`] to
/// get [`SessionError::CommandTimeout`](crate::SessionError::CommandTimeout)
/// instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Resolve with the partial output.
    #[default]
    Resolve,
    /// Reject with a timeout error carrying the partial output.
    Fail,
}

/// Configuration for a single command runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How long `start()` waits for a prompt before connecting optimistically.
    pub connection_timeout: Duration,
    /// How long a command may run before it completes by timeout.
    pub command_timeout: Duration,
    /// Working directory for the process.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
    /// Terminal type.
    pub term: String,
    /// Terminal size.
    pub size: TerminalSize,
    /// Prompt and readiness detection policy.
    pub prompts: PromptPatterns,
    /// Behaviour when a command times out.
    pub timeout_policy: TimeoutPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            cwd: None,
            env: HashMap::new(),
            term: DEFAULT_TERM.to_string(),
            size: TerminalSize::default(),
            prompts: PromptPatterns::shell(),
            timeout_policy: TimeoutPolicy::Resolve,
        }
    }
}

impl RunnerConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the per-command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the terminal type.
    pub fn with_term(mut self, term: impl Into<String>) -> Self {
        self.term = term.into();
        self
    }

    /// Sets the terminal size.
    pub fn with_size(mut self, size: TerminalSize) -> Self {
        self.size = size;
        self
    }

    /// Sets the prompt detection policy.
    pub fn with_prompts(mut self, prompts: PromptPatterns) -> Self {
        self.prompts = prompts;
        self
    }

    /// Sets the command timeout policy.
    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }
}

/// Configuration for the session registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum concurrently running sessions.
    pub max_processes: usize,
    /// How often terminal sessions are swept.
    pub sweep_interval: Duration,
    /// How long a terminal session is kept, measured from its start.
    pub retention: Duration,
    /// Runner configuration for sessions started through the registry.
    pub runner: RunnerConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_processes: 10,
            sweep_interval: Duration::from_secs(60),
            retention: Duration::from_secs(300),
            runner: RunnerConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of running sessions.
    pub fn with_max_processes(mut self, max: usize) -> Self {
        self.max_processes = max;
        self
    }

    /// Sets the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the retention window for terminal sessions.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Sets the runner configuration.
    pub fn with_runner(mut self, runner: RunnerConfig) -> Self {
        self.runner = runner;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_runner_config() {
        let config = RunnerConfig::default();

        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert_eq!(config.command_timeout, Duration::from_secs(30));
        assert!(config.cwd.is_none());
        assert_eq!(config.term, "xterm-256color");
        assert_eq!(config.timeout_policy, TimeoutPolicy::Resolve);
    }

    #[test]
    fn test_runner_config_builder() {
        let config = RunnerConfig::new()
            .with_connection_timeout(Duration::from_millis(500))
            .with_command_timeout(Duration::from_secs(5))
            .with_cwd("/srv/app")
            .with_env("NO_COLOR", "1")
            .with_term("dumb")
            .with_timeout_policy(TimeoutPolicy::Fail);

        assert_eq!(config.connection_timeout, Duration::from_millis(500));
        assert_eq!(config.command_timeout, Duration::from_secs(5));
        assert_eq!(config.cwd, Some(PathBuf::from("/srv/app")));
        assert_eq!(config.env.get("NO_COLOR").map(String::as_str), Some("1"));
        assert_eq!(config.term, "dumb");
        assert_eq!(config.timeout_policy, TimeoutPolicy::Fail);
    }

    #[test]
    fn test_default_registry_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.max_processes, 10);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.retention, Duration::from_secs(300));
    }

    #[test]
    fn test_registry_config_builder() {
        let config = RegistryConfig::new()
            .with_max_processes(2)
            .with_sweep_interval(Duration::from_millis(100))
            .with_retention(Duration::from_secs(1))
            .with_runner(RunnerConfig::new().with_command_timeout(Duration::from_secs(1)));

        assert_eq!(config.max_processes, 2);
        assert_eq!(config.sweep_interval, Duration::from_millis(100));
        assert_eq!(config.retention, Duration::from_secs(1));
        assert_eq!(config.runner.command_timeout, Duration::from_secs(1));
    }
}
