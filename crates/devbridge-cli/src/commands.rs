//! Command handlers for CLI subcommands.

use std::collections::HashMap;

use devbridge_runtime::{ProcessManager, RegistryConfig, SessionDescriptor, SessionRegistry};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::resolve_shell;

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Session ID used by `exec`.
const EXEC_SESSION: &str = "exec";

/// One executed command and its output.
#[derive(Debug, Serialize)]
pub struct ExecResult {
    /// The command line.
    pub command: String,
    /// Scrubbed output.
    pub output: String,
}

#[derive(Debug, Serialize)]
struct ExecReport {
    session: SessionDescriptor,
    results: Vec<ExecResult>,
}

/// Runs a command once and prints its transcript.
pub fn cmd_run(config: RegistryConfig, command: &str, args: Vec<String>) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let output = runtime.block_on(async {
        let registry = SessionRegistry::new(config);
        registry.run_command(command, args, None).await
    })?;

    println!("{}", output);
    Ok(())
}

/// Starts a shell session, executes `commands` in order and prints the results.
pub fn cmd_exec(config: RegistryConfig, shell: Option<&str>, commands: Vec<String>, json: bool) -> Result<()> {
    let shell = resolve_shell(shell)?;
    let runtime = tokio::runtime::Runtime::new()?;

    let (session, results) = runtime.block_on(async {
        let mut manager = ProcessManager::new(config);
        manager.start().await?;
        let outcome = exec_in_session(&manager.registry(), &shell, &commands).await;
        manager.shutdown().await?;
        outcome
    })?;

    if json {
        let report = ExecReport { session, results };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for result in results {
            println!("$ {}", result.command);
            if !result.output.is_empty() {
                println!("{}", result.output);
            }
        }
    }

    Ok(())
}

/// Executes each command in a fresh session, stopping at the first failure.
pub async fn exec_in_session(
    registry: &SessionRegistry,
    shell: &str,
    commands: &[String],
) -> Result<(SessionDescriptor, Vec<ExecResult>)> {
    let mut metadata = HashMap::new();
    metadata.insert("source".to_string(), serde_json::json!("devbridge exec"));

    registry.start_process(EXEC_SESSION, shell, vec![], metadata).await?;
    registry.wait_until_connected(EXEC_SESSION).await?;
    info!(shell = %shell, count = commands.len(), "executing commands");

    let mut results = Vec::with_capacity(commands.len());
    for command in commands {
        debug!(command = %command, "exec");
        let output = registry.execute_process_command(EXEC_SESSION, command).await?;
        results.push(ExecResult {
            command: command.clone(),
            output,
        });
    }

    let session = registry.get_process(EXEC_SESSION).await?;
    registry.stop_process(EXEC_SESSION).await;

    Ok((session, results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use devbridge_pty::MockPtySpawner;
    use devbridge_runtime::{SessionError, SessionStatus};
    use std::sync::Arc;

    fn registry() -> SessionRegistry {
        let spawner = MockPtySpawner::new()
            .with_banner("$ ")
            .with_responder(|line| match line {
                "pwd" => Some("pwd\r\n/srv/app\r\n$ ".to_string()),
                other => Some(format!("{other}\r\n$ ")),
            });
        SessionRegistry::with_spawner(RegistryConfig::default(), Arc::new(spawner))
    }

    #[tokio::test(start_paused = true)]
    async fn test_exec_in_session() {
        let registry = registry();
        let commands = vec!["pwd".to_string(), "true".to_string()];

        let (session, results) = exec_in_session(&registry, "/bin/sh", &commands).await.unwrap();

        assert_eq!(session.command, "/bin/sh");
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.metadata["source"], "devbridge exec");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].output, "/srv/app");
        assert_eq!(results[1].output, "");
        assert_eq!(registry.get_process(EXEC_SESSION).await.unwrap().status, SessionStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exec_report_serializes() {
        let registry = registry();
        let (session, results) = exec_in_session(&registry, "sh", &["pwd".to_string()]).await.unwrap();

        let json = serde_json::to_value(ExecReport { session, results }).unwrap();

        assert_eq!(json["session"]["id"], "exec");
        assert_eq!(json["session"]["status"], "running");
        assert_eq!(json["results"][0]["output"], "/srv/app");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exec_rejects_second_session_with_same_id() {
        let registry = registry();
        registry.start_process(EXEC_SESSION, "sh", vec![], HashMap::new()).await.unwrap();

        let result = exec_in_session(&registry, "sh", &["pwd".to_string()]).await;

        let error = result.unwrap_err();
        assert!(matches!(error.downcast_ref::<SessionError>(), Some(SessionError::DuplicateId(_))));
    }
}
