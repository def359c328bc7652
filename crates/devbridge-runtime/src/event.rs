//! Runner and registry events.

use crate::runner::RunnerState;

/// Events emitted by a single command runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    /// A chunk of raw output arrived.
    Output(String),
    /// The runner moved to a new state.
    StateChanged(RunnerState),
    /// The process exited.
    Exited {
        /// Exit code, when known.
        exit_code: Option<i32>,
    },
}

/// Events emitted by the session registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A session was registered and is connecting.
    SessionStarted {
        /// Session ID.
        id: String,
    },
    /// A session finished connecting.
    SessionConnected {
        /// Session ID.
        id: String,
    },
    /// A session was stopped or exited cleanly.
    SessionStopped {
        /// Session ID.
        id: String,
    },
    /// A session failed to connect or exited abnormally.
    SessionErrored {
        /// Session ID.
        id: String,
        /// Error message.
        error: String,
    },
    /// A terminal session was evicted by the sweep.
    SessionEvicted {
        /// Session ID.
        id: String,
    },
}

impl RegistryEvent {
    /// Returns the session ID associated with this event.
    pub fn id(&self) -> &str {
        match self {
            RegistryEvent::SessionStarted { id }
            | RegistryEvent::SessionConnected { id }
            | RegistryEvent::SessionStopped { id }
            | RegistryEvent::SessionErrored { id, .. }
            | RegistryEvent::SessionEvicted { id } => id,
        }
    }

    /// Returns true if this is an error event.
    pub fn is_error(&self) -> bool {
        matches!(self, RegistryEvent::SessionErrored { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id() {
        let events = [
            RegistryEvent::SessionStarted { id: "a".to_string() },
            RegistryEvent::SessionConnected { id: "a".to_string() },
            RegistryEvent::SessionStopped { id: "a".to_string() },
            RegistryEvent::SessionErrored {
                id: "a".to_string(),
                error: "boom".to_string(),
            },
            RegistryEvent::SessionEvicted { id: "a".to_string() },
        ];

        for event in &events {
            assert_eq!(event.id(), "a");
        }
    }

    #[test]
    fn test_event_is_error() {
        let event = RegistryEvent::SessionStarted { id: "a".to_string() };
        assert!(!event.is_error());

        let event = RegistryEvent::SessionErrored {
            id: "a".to_string(),
            error: "boom".to_string(),
        };
        assert!(event.is_error());
    }
}
