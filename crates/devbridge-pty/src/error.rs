//! Error types for pseudo-terminal operations.

use thiserror::Error;

/// Errors that can occur while spawning or driving a PTY-attached process.
#[derive(Error, Debug)]
pub enum PtyError {
    /// The pseudo-terminal could not be opened or the process could not be spawned.
    #[error("failed to spawn '{command}': {reason}")]
    Spawn {
        /// Command that was being spawned.
        command: String,
        /// Underlying failure.
        reason: String,
    },

    /// The channel has been killed or its process has exited.
    #[error("channel closed")]
    Closed,

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PtyError {
    /// Builds a spawn error from any displayable cause.
    pub fn spawn(command: &str, reason: impl std::fmt::Display) -> Self {
        PtyError::Spawn {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for PTY operations.
pub type Result<T> = std::result::Result<T, PtyError>;
