//! Maps command-line options onto runtime configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use devbridge_runtime::{RegistryConfig, RunnerConfig, TimeoutPolicy};
use thiserror::Error;

use crate::cli::Cli;

/// Shells tried in order when none is requested.
const FALLBACK_SHELLS: &[&str] = &["bash", "sh"];

/// Invalid command-line configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The working directory is missing or not a directory.
    #[error("invalid working directory {path}: {reason}")]
    InvalidCwd { path: String, reason: String },

    /// No usable shell binary.
    #[error("shell not found: {0}")]
    ShellNotFound(String),
}

/// Builds the registry configuration from the parsed command line.
pub fn registry_config(cli: &Cli) -> Result<RegistryConfig, ConfigError> {
    let mut runner = RunnerConfig::new()
        .with_connection_timeout(Duration::from_millis(cli.connection_timeout_ms))
        .with_command_timeout(Duration::from_millis(cli.command_timeout_ms));

    if cli.fail_on_timeout {
        runner = runner.with_timeout_policy(TimeoutPolicy::Fail);
    }

    if let Some(cwd) = &cli.cwd {
        runner = runner.with_cwd(resolve_cwd(cwd)?);
    }

    Ok(RegistryConfig::new()
        .with_max_processes(cli.max_processes)
        .with_runner(runner))
}

/// Expands `~` and environment variables, and checks the result is a directory.
pub fn resolve_cwd(raw: &str) -> Result<PathBuf, ConfigError> {
    let expanded = shellexpand::full(raw).map_err(|e| ConfigError::InvalidCwd {
        path: raw.to_string(),
        reason: e.to_string(),
    })?;
    let path = PathBuf::from(expanded.as_ref());

    if !path.is_dir() {
        return Err(ConfigError::InvalidCwd {
            path: path.display().to_string(),
            reason: "not a directory".to_string(),
        });
    }

    Ok(path)
}

/// Resolves the shell to spawn.
///
/// A requested shell may be a path or a name looked up on `PATH`; without one
/// the first fallback found on `PATH` is used.
pub fn resolve_shell(requested: Option<&str>) -> Result<String, ConfigError> {
    match requested.map(str::trim).filter(|s| !s.is_empty()) {
        Some(shell) => {
            let expanded = shellexpand::tilde(shell);
            let path = Path::new(expanded.as_ref());
            if path.is_absolute() {
                if path.exists() {
                    return Ok(path.display().to_string());
                }
                return Err(ConfigError::ShellNotFound(shell.to_string()));
            }
            which::which(path)
                .map(|p| p.display().to_string())
                .map_err(|_| ConfigError::ShellNotFound(shell.to_string()))
        }
        None => FALLBACK_SHELLS
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(|p| p.display().to_string())
            .ok_or_else(|| ConfigError::ShellNotFound(FALLBACK_SHELLS.join(", "))),
    }
}
