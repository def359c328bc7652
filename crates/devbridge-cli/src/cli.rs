//! Command-line interface definition using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Build version string with git hash and build date.
fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");
    const BUILD_DATE: &str = env!("BUILD_DATE");

    // Format: "0.1.0 (abc1234, 2026-01-29)"
    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    VERSION_STRING.get_or_init(|| format!("{} ({}, {})", VERSION, GIT_HASH, BUILD_DATE))
}

/// devbridge - drive interactive developer tools through a pseudo-terminal
#[derive(Parser, Debug)]
#[command(name = "devbridge")]
#[command(author, version = version_string(), about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to state directory (REPL history)
    #[arg(long, env = "DEVBRIDGE_STATE_DIR")]
    pub state_dir: Option<String>,

    /// Working directory for spawned processes
    #[arg(short = 'C', long, env = "DEVBRIDGE_CWD")]
    pub cwd: Option<String>,

    /// Maximum concurrently running sessions
    #[arg(long, env = "DEVBRIDGE_MAX_PROCESSES", default_value_t = 10)]
    pub max_processes: usize,

    /// Milliseconds to wait for a prompt after spawning
    #[arg(long, env = "DEVBRIDGE_CONNECTION_TIMEOUT_MS", default_value_t = 10_000)]
    pub connection_timeout_ms: u64,

    /// Milliseconds a command may run before it completes by timeout
    #[arg(long, env = "DEVBRIDGE_COMMAND_TIMEOUT_MS", default_value_t = 30_000)]
    pub command_timeout_ms: u64,

    /// Treat a command timeout as an error instead of returning partial output
    #[arg(long)]
    pub fail_on_timeout: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command once and print what it printed while starting
    Run {
        /// Command to run
        #[arg(required = true)]
        command: String,

        /// Arguments for the command
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Start a shell session and execute commands in order
    Exec {
        /// Shell to spawn (default: $SHELL, then bash, then sh)
        #[arg(short, long, env = "SHELL")]
        shell: Option<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Commands to execute
        #[arg(required = true)]
        commands: Vec<String>,
    },

    /// Start an interactive shell session
    Shell {
        /// Shell to spawn (default: $SHELL, then bash, then sh)
        #[arg(short, long, env = "SHELL")]
        shell: Option<String>,
    },
}

impl Cli {
    /// Returns the log level based on verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }

    /// Returns the state directory path, using default if not specified.
    pub fn state_dir(&self) -> PathBuf {
        match &self.state_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).into_owned()),
            None => dirs::home_dir()
                .map(|h| h.join(".devbridge"))
                .unwrap_or_else(|| PathBuf::from(".devbridge")),
        }
    }
}
