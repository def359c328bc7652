//! Scripted in-process channels for tests.
//!
//! `MockPtySpawner` never touches the OS. Each spawn produces a
//! [`MockTerminal`] that tests use to push output, end the process and
//! inspect what was written to it. An optional responder answers each
//! complete input line, which is enough to imitate an interactive shell.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::channel::{ChannelEvent, PtySpawner, SessionChannel, SpawnRequest, SpawnedChannel};
use crate::{PtyError, Result};

type Responder = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Exit code reported when a mock process is killed.
pub const KILLED_EXIT_CODE: i32 = 137;

#[derive(Default)]
struct SpawnerState {
    banner: Option<String>,
    responder: Option<Responder>,
    exit_on_spawn: Option<i32>,
    fail_spawn: Option<String>,
    terminals: Vec<MockTerminal>,
}

/// Spawner producing scripted terminals.
#[derive(Clone, Default)]
pub struct MockPtySpawner {
    state: Arc<Mutex<SpawnerState>>,
}

impl MockPtySpawner {
    /// Creates a spawner whose processes stay silent until driven.
    pub fn new() -> Self {
        Self::default()
    }

    /// Output emitted immediately on spawn, typically a prompt.
    pub fn with_banner(self, banner: impl Into<String>) -> Self {
        self.lock().banner = Some(banner.into());
        self
    }

    /// Answers every complete input line (without its newline).
    pub fn with_responder<F>(self, responder: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lock().responder = Some(Arc::new(responder));
        self
    }

    /// Makes every spawned process exit right after its banner.
    pub fn with_exit_on_spawn(self, code: i32) -> Self {
        self.lock().exit_on_spawn = Some(code);
        self
    }

    /// Makes every spawn attempt fail.
    pub fn with_spawn_failure(self, reason: impl Into<String>) -> Self {
        self.lock().fail_spawn = Some(reason.into());
        self
    }

    /// All terminals spawned so far, oldest first.
    pub fn terminals(&self) -> Vec<MockTerminal> {
        self.lock().terminals.clone()
    }

    /// The most recently spawned terminal.
    pub fn last_terminal(&self) -> Option<MockTerminal> {
        self.lock().terminals.last().cloned()
    }

    /// Number of spawn calls that succeeded.
    pub fn spawn_count(&self) -> usize {
        self.lock().terminals.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SpawnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PtySpawner for MockPtySpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedChannel> {
        let mut state = self.lock();
        if let Some(reason) = &state.fail_spawn {
            return Err(PtyError::spawn(&request.command, reason));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let terminal = MockTerminal {
            request: request.clone(),
            events: events_tx,
            inputs: Arc::new(Mutex::new(Vec::new())),
            killed: Arc::new(AtomicBool::new(false)),
        };

        if let Some(banner) = &state.banner {
            terminal.emit(banner.clone());
        }
        if let Some(code) = state.exit_on_spawn {
            terminal.exit(Some(code));
        }

        state.terminals.push(terminal.clone());

        Ok(SpawnedChannel {
            channel: Box::new(MockChannel {
                terminal,
                responder: state.responder.clone(),
                line: String::new(),
            }),
            events: events_rx,
        })
    }
}

/// Test-side handle to a spawned mock process.
#[derive(Clone)]
pub struct MockTerminal {
    request: SpawnRequest,
    events: mpsc::UnboundedSender<ChannelEvent>,
    inputs: Arc<Mutex<Vec<String>>>,
    killed: Arc<AtomicBool>,
}

impl MockTerminal {
    /// The request this terminal was spawned with.
    pub fn request(&self) -> &SpawnRequest {
        &self.request
    }

    /// Pushes a chunk of output.
    pub fn emit(&self, output: impl Into<String>) {
        let _ = self.events.send(ChannelEvent::Output(output.into()));
    }

    /// Ends the process with the given exit code.
    pub fn exit(&self, code: Option<i32>) {
        let _ = self.events.send(ChannelEvent::Exit(code));
    }

    /// Everything written to the terminal, one entry per write.
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Whether the channel was killed.
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

struct MockChannel {
    terminal: MockTerminal,
    responder: Option<Responder>,
    line: String,
}

impl SessionChannel for MockChannel {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.terminal.is_killed() {
            return Err(PtyError::Closed);
        }

        let text = String::from_utf8_lossy(data).into_owned();
        self.terminal
            .inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.clone());

        self.line.push_str(&text);
        while let Some(pos) = self.line.find('\n') {
            let line: String = self.line.drain(..=pos).collect();
            let line = line.trim_end_matches(['\r', '\n']);
            if let Some(reply) = self.responder.as_ref().and_then(|r| r(line)) {
                self.terminal.emit(reply);
            }
        }

        Ok(())
    }

    fn kill(&mut self) -> Result<()> {
        if !self.terminal.killed.swap(true, Ordering::SeqCst) {
            self.terminal.exit(Some(KILLED_EXIT_CODE));
        }
        Ok(())
    }

    fn process_id(&self) -> Option<u32> {
        None
    }
}
