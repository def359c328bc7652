//! Session channel abstractions.
//!
//! A session channel is one OS process attached to a pseudo-terminal. It
//! accepts raw input, produces a stream of output chunks and reports its exit
//! exactly once.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::Result;

/// Terminal type advertised to spawned processes by default.
pub const DEFAULT_TERM: &str = "xterm-256color";

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    /// Number of rows.
    pub rows: u16,
    /// Number of columns.
    pub cols: u16,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

/// Everything needed to spawn a process on a pseudo-terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    /// Program to run.
    pub command: String,
    /// Program arguments.
    pub args: Vec<String>,
    /// Working directory, inherited from the caller when unset.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables layered over the inherited environment.
    pub env: HashMap<String, String>,
    /// Value of `TERM` for the child.
    pub term: String,
    /// Initial terminal size.
    pub size: TerminalSize,
}

impl SpawnRequest {
    /// Creates a request for `command` with default terminal settings.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            term: DEFAULT_TERM.to_string(),
            size: TerminalSize::default(),
        }
    }

    /// Sets the argument list.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
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

    /// Renders the command line for logs.
    pub fn display_command(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// Events produced by a session channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A chunk of terminal output.
    Output(String),
    /// The process exited. Sent once, after all output has been delivered.
    Exit(Option<i32>),
}

/// Handle to a live PTY-attached process.
pub trait SessionChannel: Send {
    /// Writes raw bytes to the terminal.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Kills the process. Killing an already dead process is not an error.
    fn kill(&mut self) -> Result<()>;

    /// OS process id, when known.
    fn process_id(&self) -> Option<u32>;
}

/// A freshly spawned channel and its event stream.
pub struct SpawnedChannel {
    /// Control handle.
    pub channel: Box<dyn SessionChannel>,
    /// Output and exit notifications.
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl fmt::Debug for SpawnedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnedChannel")
            .field("process_id", &self.channel.process_id())
            .finish()
    }
}

/// Process-spawning primitive.
pub trait PtySpawner: Send + Sync {
    /// Spawns the requested process on a new pseudo-terminal.
    ///
    /// Must be called from within a tokio runtime.
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedChannel>;
}

/// Incremental UTF-8 decoder for terminal reads.
///
/// A multi-byte character split across two reads is held back until the
/// remaining bytes arrive; invalid sequences decode lossily.
#[derive(Debug, Default)]
pub struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `bytes`, returning whatever forms complete characters.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let split = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.pending.len(),
        };

        let rest = self.pending.split_off(split);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = rest;
        text
    }

    /// Flushes any held-back bytes.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}
