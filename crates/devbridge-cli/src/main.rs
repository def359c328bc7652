//! devbridge CLI entry point.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use devbridge_cli::cli::{Cli, Commands};
use devbridge_cli::commands;
use devbridge_cli::config::{registry_config, resolve_shell};
use devbridge_cli::repl::Repl;

fn main() {
    // Load .env.local if it exists (DEVBRIDGE_* overrides)
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> commands::Result<()> {
    let config = registry_config(&cli)?;
    let state_dir = cli.state_dir();

    match cli.command {
        Some(Commands::Run { command, args }) => commands::cmd_run(config, &command, args),
        Some(Commands::Exec { shell, json, commands }) => {
            commands::cmd_exec(config, shell.as_deref(), commands, json)
        }
        Some(Commands::Shell { shell }) => run_repl(&state_dir, config, shell.as_deref()),
        // No command = enter the shell REPL
        None => run_repl(&state_dir, config, std::env::var("SHELL").ok().as_deref()),
    }
}

fn run_repl(
    state_dir: &std::path::Path,
    config: devbridge_runtime::RegistryConfig,
    shell: Option<&str>,
) -> commands::Result<()> {
    let shell = resolve_shell(shell)?;
    let mut repl = Repl::new(state_dir, config, shell)?;
    repl.run()
}
