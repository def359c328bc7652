//! Interactive session runtime for devbridge.
//!
//! This crate drives long-lived shell processes on pseudo-terminals:
//! - `CommandRunner` - one process, a FIFO of commands, prompt-based completion
//! - `SessionRegistry` - many runners keyed by ID, under a capacity limit
//! - `SessionSweeper` - evicts finished sessions after a retention window
//! - `ProcessManager` - main entry point combining registry and sweeper
//!
//! # Example
//!
//! ```no_run
//! use std::collections::HashMap;
//! use devbridge_runtime::{ProcessManager, RegistryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut manager = ProcessManager::new(RegistryConfig::default());
//!     manager.start().await?;
//!
//!     let registry = manager.registry();
//!     registry.start_process("shell", "bash", vec![], HashMap::new()).await?;
//!     registry.wait_until_connected("shell").await?;
//!
//!     let output = registry.execute_process_command("shell", "echo hi").await?;
//!     println!("{}", output);
//!
//!     manager.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Key Concepts
//!
//! ## CommandRunner
//!
//! Each runner is an actor task that owns its channel. Commands are written
//! one at a time; a command completes when the output ends in a shell prompt
//! or when its timeout elapses. Prompt detection is heuristic and
//! configurable through [`PromptPatterns`].
//!
//! ## SessionRegistry
//!
//! The registry starts runners in the background, tracks their status as
//! `Running`, `Stopped` or `Errored`, and hands out descriptor snapshots.
//! Finished sessions stay visible until swept.

pub mod config;
pub mod error;
pub mod event;
pub mod manager;
pub mod prompt;
pub mod registry;
pub mod runner;
pub mod scrub;
pub mod sweeper;

pub use config::{RegistryConfig, RunnerConfig, TimeoutPolicy};
pub use error::{Result, SessionError};
pub use event::{RegistryEvent, RunnerEvent};
pub use manager::ProcessManager;
pub use prompt::{Pattern, PromptPatterns};
pub use registry::{SessionDescriptor, SessionRegistry, SessionStatus};
pub use runner::{CommandRunner, RunnerState};
pub use sweeper::SessionSweeper;
