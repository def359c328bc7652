//! Error types for the session runtime.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while running or supervising sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Invalid construction, such as an empty command.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The process exited before the session became ready.
    #[error("connection failed: process exited with code {exit_code:?} before becoming ready")]
    ConnectionTimeout {
        /// Exit code of the process, when known.
        exit_code: Option<i32>,
    },

    /// The registry is at its session limit.
    #[error("capacity exceeded: at most {0} running sessions")]
    CapacityExceeded(usize),

    /// A session with this id is already registered.
    #[error("session already exists: {0}")]
    DuplicateId(String),

    /// No session with this id.
    #[error("session not found: {0}")]
    NotFound(String),

    /// The session is not connected.
    #[error("session not running: {0}")]
    NotRunning(String),

    /// The session's process exited while a command was in flight.
    #[error("command failed: process exited with code {exit_code:?}")]
    CommandExecutionFailed {
        /// Exit code of the process, when known.
        exit_code: Option<i32>,
    },

    /// No prompt was seen before the command timeout, under the failing timeout policy.
    #[error("command timed out after {timeout:?}")]
    CommandTimeout {
        /// The timeout that elapsed.
        timeout: Duration,
        /// Scrubbed output captured before the deadline.
        partial_output: String,
    },

    /// The runner or manager was already started.
    #[error("already started")]
    AlreadyStarted,

    /// The manager was never started.
    #[error("not started")]
    NotStarted,

    /// Shutdown error.
    #[error("shutdown error: {0}")]
    Shutdown(String),

    /// Pseudo-terminal error.
    #[error("pty error: {0}")]
    Pty(#[from] devbridge_pty::PtyError),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
