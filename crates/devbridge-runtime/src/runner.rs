//! Command runner: one interactive process on a pseudo-terminal.
//!
//! The runner is an actor. A single task owns the channel, the command queue,
//! the in-flight command and every state transition; the [`CommandRunner`]
//! handle only sends it messages and reads published snapshots. Commands are
//! answered through per-command `oneshot` sinks in submission order, and at
//! most one command is dispatched to the process at a time.
//!
//! Completion of a command is detected heuristically: the output ends in a
//! shell prompt, or the command timeout elapses. See [`TimeoutPolicy`] for
//! what a timeout delivers.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use devbridge_pty::{ChannelEvent, PtySpawner, SessionChannel, SpawnRequest};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::{RunnerConfig, TimeoutPolicy};
use crate::error::{Result, SessionError};
use crate::event::RunnerEvent;
use crate::scrub::scrub_output;

/// Lifecycle of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    /// Not started, stopped, or exited cleanly.
    Disconnected,
    /// Process spawned, waiting for readiness.
    Connecting,
    /// Ready for commands.
    Connected,
    /// A command is in flight.
    Executing,
    /// Failed to connect or exited abnormally.
    Errored,
}

impl RunnerState {
    /// Whether commands can be submitted.
    pub fn is_running(self) -> bool {
        matches!(self, RunnerState::Connected | RunnerState::Executing)
    }

    /// Whether the runner is in a state it never leaves once started.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunnerState::Disconnected | RunnerState::Errored)
    }
}

/// State published by the actor and read by handles.
struct Shared {
    state: watch::Sender<RunnerState>,
    // Written only by the actor task.
    buffer: Mutex<String>,
    // Everything printed before the session connected or exited.
    transcript: Mutex<String>,
    events: broadcast::Sender<RunnerEvent>,
}

impl Shared {
    fn state(&self) -> RunnerState {
        *self.state.borrow()
    }

    fn set_state(&self, next: RunnerState) {
        if self.state.send_replace(next) != next {
            let _ = self.events.send(RunnerEvent::StateChanged(next));
        }
    }

    fn buffer(&self) -> MutexGuard<'_, String> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transcript(&self) -> MutexGuard<'_, String> {
        self.transcript.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct PendingCommand {
    text: String,
    sink: oneshot::Sender<Result<String>>,
}

struct InFlight {
    command: PendingCommand,
    deadline: Instant,
}

enum RunnerMessage {
    Execute(PendingCommand),
    Write(Vec<u8>),
    Stop(oneshot::Sender<()>),
}

/// Drives one interactive process.
pub struct CommandRunner {
    label: String,
    command: String,
    args: Vec<String>,
    config: RunnerConfig,
    spawner: Arc<dyn PtySpawner>,
    shared: Arc<Shared>,
    mailbox: OnceLock<mpsc::UnboundedSender<RunnerMessage>>,
}

impl fmt::Debug for CommandRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRunner")
            .field("label", &self.label)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("state", &self.state())
            .finish()
    }
}

impl CommandRunner {
    /// Creates a runner for `command`. Nothing is spawned until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Configuration` if the command is empty.
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        config: RunnerConfig,
        spawner: Arc<dyn PtySpawner>,
    ) -> Result<Self> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(SessionError::Configuration("command must not be empty".to_string()));
        }

        let (state, _) = watch::channel(RunnerState::Disconnected);
        let (events, _) = broadcast::channel(256);

        Ok(Self {
            label: command.clone(),
            command,
            args,
            config,
            spawner,
            shared: Arc::new(Shared {
                state,
                buffer: Mutex::new(String::new()),
                transcript: Mutex::new(String::new()),
                events,
            }),
            mailbox: OnceLock::new(),
        })
    }

    /// Sets the name used in logs and errors, usually the session id.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// The name used in logs and errors.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The runner configuration.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Spawns the process and waits until it is ready.
    ///
    /// Resolves once the output looks ready (a prompt or a readiness marker),
    /// or once the connection timeout elapses with the process still alive;
    /// in the latter case the runner connects anyway and keeps the buffered
    /// output.
    ///
    /// # Errors
    ///
    /// - `SessionError::ConnectionTimeout` if the process exits first.
    /// - `SessionError::Pty` if the process cannot be spawned.
    /// - `SessionError::AlreadyStarted` on a second call.
    /// - `SessionError::NotRunning` if the runner is stopped while connecting.
    pub async fn start(&self) -> Result<()> {
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        if self.mailbox.set(mailbox_tx).is_err() {
            return Err(SessionError::AlreadyStarted);
        }

        self.shared.set_state(RunnerState::Connecting);

        let mut request = SpawnRequest::new(&self.command)
            .with_args(self.args.iter().cloned())
            .with_term(&self.config.term)
            .with_size(self.config.size);
        request.cwd = self.config.cwd.clone();
        request.env = self.config.env.clone();

        let spawned = match self.spawner.spawn(&request) {
            Ok(spawned) => spawned,
            Err(e) => {
                warn!(session_id = %self.label, error = %e, "failed to spawn process");
                self.shared.set_state(RunnerState::Errored);
                return Err(e.into());
            }
        };

        info!(
            session_id = %self.label,
            command = %request.display_command(),
            pid = ?spawned.channel.process_id(),
            "process spawned"
        );

        let actor = RunnerActor {
            label: self.label.clone(),
            config: self.config.clone(),
            channel: spawned.channel,
            channel_events: spawned.events,
            mailbox: mailbox_rx,
            shared: Arc::clone(&self.shared),
            queue: VecDeque::new(),
            in_flight: None,
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(actor.run(ready_tx));

        ready_rx
            .await
            .unwrap_or(Err(SessionError::ConnectionTimeout { exit_code: None }))
    }

    /// Runs a command and returns its scrubbed output.
    ///
    /// Commands are queued and answered in submission order. When no prompt
    /// appears before the command timeout, the default
    /// [`TimeoutPolicy::Resolve`] returns the output captured so far as a
    /// successful result.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotRunning` if the runner is not connected, or stops
    ///   before the command is dispatched.
    /// - `SessionError::CommandExecutionFailed` if the process exits while the
    ///   command is in flight.
    /// - `SessionError::CommandTimeout` on timeout under [`TimeoutPolicy::Fail`].
    pub async fn execute_command(&self, text: &str) -> Result<String> {
        if !self.is_running() {
            return Err(self.not_running());
        }

        let (sink, result) = oneshot::channel();
        self.send(RunnerMessage::Execute(PendingCommand {
            text: text.to_string(),
            sink,
        }))?;

        result.await.map_err(|_| self.not_running())?
    }

    /// Writes raw input without waiting for any response.
    pub fn write(&self, input: &str) -> Result<()> {
        if !self.is_running() {
            return Err(self.not_running());
        }
        self.send(RunnerMessage::Write(input.as_bytes().to_vec()))
    }

    /// Kills the process immediately and leaves the runner `Disconnected`,
    /// also after a failed start or an abnormal exit. Calling it again is a
    /// no-op.
    ///
    /// A runner stopped before it was started can no longer be started.
    pub async fn stop(&self) {
        let (closed, _) = mpsc::unbounded_channel();
        if self.mailbox.set(closed).is_ok() {
            self.shared.set_state(RunnerState::Disconnected);
            return;
        }
        let Some(mailbox) = self.mailbox.get() else {
            return;
        };

        let (ack, done) = oneshot::channel();
        if mailbox.send(RunnerMessage::Stop(ack)).is_ok() {
            let _ = done.await;
        }
        // The task is gone by now; an earlier failure is superseded.
        self.shared.set_state(RunnerState::Disconnected);
    }

    /// Snapshot of the output buffered since the last reset.
    pub fn get_output(&self) -> String {
        self.shared.buffer().clone()
    }

    /// Everything the process printed while connecting, unaffected by
    /// buffer resets.
    pub fn connect_transcript(&self) -> String {
        self.shared.transcript().clone()
    }

    /// Whether commands can be submitted.
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Current state.
    pub fn state(&self) -> RunnerState {
        self.shared.state()
    }

    /// Subscribe to output, state and exit events.
    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.shared.events.subscribe()
    }

    /// Waits until the runner has finished connecting.
    ///
    /// Useful when [`start`](Self::start) is driven by another task. Waits
    /// for a start that has not happened yet.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotRunning` if the runner failed to connect or
    /// has already terminated.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut rx = self.shared.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            if state.is_running() {
                return Ok(());
            }
            let started = self.mailbox.get().is_some();
            if state == RunnerState::Errored || (state == RunnerState::Disconnected && started) {
                return Err(self.not_running());
            }
            if rx.changed().await.is_err() {
                return Err(self.not_running());
            }
        }
    }

    /// Waits until the runner reaches a terminal state and returns it.
    ///
    /// Meant to be called after [`start`](Self::start); a runner that was
    /// never started is already `Disconnected`.
    pub async fn wait_terminated(&self) -> RunnerState {
        let mut rx = self.shared.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            if state.is_terminal() {
                return state;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }

    fn send(&self, message: RunnerMessage) -> Result<()> {
        let mailbox = self.mailbox.get().ok_or_else(|| self.not_running())?;
        mailbox.send(message).map_err(|_| self.not_running())
    }

    fn not_running(&self) -> SessionError {
        SessionError::NotRunning(self.label.clone())
    }
}

enum Flow {
    Continue,
    Exit,
}

/// The task that owns the channel.
struct RunnerActor {
    label: String,
    config: RunnerConfig,
    channel: Box<dyn SessionChannel>,
    channel_events: mpsc::UnboundedReceiver<ChannelEvent>,
    mailbox: mpsc::UnboundedReceiver<RunnerMessage>,
    shared: Arc<Shared>,
    queue: VecDeque<PendingCommand>,
    in_flight: Option<InFlight>,
}

impl RunnerActor {
    async fn run(mut self, ready: oneshot::Sender<Result<()>>) {
        let connected = self.connect().await;
        let is_connected = connected.is_ok();
        let _ = ready.send(connected);

        if is_connected {
            self.serve().await;
        }

        debug!(session_id = %self.label, state = ?self.shared.state(), "runner task finished");
    }

    async fn connect(&mut self) -> Result<()> {
        let deadline = sleep(self.config.connection_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                event = self.channel_events.recv() => match event {
                    Some(ChannelEvent::Output(chunk)) => {
                        self.shared.transcript().push_str(&chunk);
                        self.append(&chunk);
                        let ready = self.config.prompts.is_ready(&self.shared.buffer());
                        if ready {
                            self.shared.buffer().clear();
                            self.shared.set_state(RunnerState::Connected);
                            info!(session_id = %self.label, "session ready");
                            return Ok(());
                        }
                    }
                    Some(ChannelEvent::Exit(exit_code)) => return Err(self.fail_connect(exit_code)),
                    None => return Err(self.fail_connect(None)),
                },
                _ = &mut deadline => {
                    warn!(
                        session_id = %self.label,
                        timeout_ms = self.config.connection_timeout.as_millis() as u64,
                        "no prompt before connection timeout, assuming connected"
                    );
                    self.shared.set_state(RunnerState::Connected);
                    return Ok(());
                }
                message = self.mailbox.recv() => match message {
                    Some(RunnerMessage::Stop(ack)) => {
                        self.kill();
                        self.shared.set_state(RunnerState::Disconnected);
                        let _ = ack.send(());
                        return Err(SessionError::NotRunning(self.label.clone()));
                    }
                    Some(RunnerMessage::Execute(command)) => {
                        let _ = command.sink.send(Err(SessionError::NotRunning(self.label.clone())));
                    }
                    Some(RunnerMessage::Write(_)) => {}
                    None => {
                        self.kill();
                        self.shared.set_state(RunnerState::Disconnected);
                        return Err(SessionError::NotRunning(self.label.clone()));
                    }
                },
            }
        }
    }

    fn fail_connect(&mut self, exit_code: Option<i32>) -> SessionError {
        warn!(session_id = %self.label, exit_code = ?exit_code, "process exited before becoming ready");
        self.kill();
        self.shared.set_state(RunnerState::Errored);
        let _ = self.shared.events.send(RunnerEvent::Exited { exit_code });
        SessionError::ConnectionTimeout { exit_code }
    }

    async fn serve(&mut self) {
        loop {
            let deadline = self.in_flight.as_ref().map(|f| f.deadline);

            let flow = tokio::select! {
                message = self.mailbox.recv() => self.on_message(message),
                event = self.channel_events.recv() => self.on_channel_event(event),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.complete(true);
                    Flow::Continue
                }
            };

            if let Flow::Exit = flow {
                return;
            }
        }
    }

    fn on_message(&mut self, message: Option<RunnerMessage>) -> Flow {
        match message {
            Some(RunnerMessage::Execute(command)) => {
                trace!(session_id = %self.label, command = %command.text, queued = self.queue.len(), "command queued");
                self.queue.push_back(command);
                self.dispatch_next();
                Flow::Continue
            }
            Some(RunnerMessage::Write(bytes)) => {
                if let Err(e) = self.channel.write(&bytes) {
                    warn!(session_id = %self.label, error = %e, "raw write failed");
                }
                Flow::Continue
            }
            Some(RunnerMessage::Stop(ack)) => {
                self.shutdown();
                let _ = ack.send(());
                Flow::Exit
            }
            None => {
                self.shutdown();
                Flow::Exit
            }
        }
    }

    fn on_channel_event(&mut self, event: Option<ChannelEvent>) -> Flow {
        match event {
            Some(ChannelEvent::Output(chunk)) => {
                self.append(&chunk);
                let done = self.in_flight.is_some() && self.config.prompts.ends_with_prompt(&self.shared.buffer());
                if done {
                    self.complete(false);
                }
                Flow::Continue
            }
            Some(ChannelEvent::Exit(exit_code)) => {
                self.on_exit(exit_code);
                Flow::Exit
            }
            None => {
                self.on_exit(None);
                Flow::Exit
            }
        }
    }

    fn dispatch_next(&mut self) {
        if self.in_flight.is_some() {
            return;
        }

        while let Some(command) = self.queue.pop_front() {
            self.shared.buffer().clear();

            let line = format!("{}\n", command.text);
            match self.channel.write(line.as_bytes()) {
                Ok(()) => {
                    debug!(session_id = %self.label, command = %command.text, "command dispatched");
                    self.in_flight = Some(InFlight {
                        deadline: Instant::now() + self.config.command_timeout,
                        command,
                    });
                    self.shared.set_state(RunnerState::Executing);
                    return;
                }
                Err(e) => {
                    warn!(session_id = %self.label, command = %command.text, error = %e, "failed to dispatch command");
                    let _ = command.sink.send(Err(e.into()));
                }
            }
        }
    }

    fn complete(&mut self, timed_out: bool) {
        let Some(flight) = self.in_flight.take() else {
            return;
        };

        let raw = std::mem::take(&mut *self.shared.buffer());
        let output = scrub_output(&raw, &flight.command.text, &self.config.prompts);

        let result = if timed_out {
            warn!(
                session_id = %self.label,
                command = %flight.command.text,
                timeout_ms = self.config.command_timeout.as_millis() as u64,
                policy = ?self.config.timeout_policy,
                "no prompt before command timeout"
            );
            match self.config.timeout_policy {
                TimeoutPolicy::Resolve => Ok(output),
                TimeoutPolicy::Fail => Err(SessionError::CommandTimeout {
                    timeout: self.config.command_timeout,
                    partial_output: output,
                }),
            }
        } else {
            debug!(session_id = %self.label, command = %flight.command.text, bytes = output.len(), "command completed");
            Ok(output)
        };

        if flight.command.sink.send(result).is_err() {
            trace!(session_id = %self.label, "caller stopped waiting for result");
        }

        self.shared.set_state(RunnerState::Connected);
        self.dispatch_next();
    }

    fn on_exit(&mut self, exit_code: Option<i32>) {
        let had_in_flight = self.in_flight.is_some();

        if let Some(flight) = self.in_flight.take() {
            warn!(
                session_id = %self.label,
                command = %flight.command.text,
                exit_code = ?exit_code,
                "process exited with command in flight"
            );
            let _ = flight
                .command
                .sink
                .send(Err(SessionError::CommandExecutionFailed { exit_code }));
        }
        self.fail_queued();

        let next = if exit_code == Some(0) && !had_in_flight {
            RunnerState::Disconnected
        } else {
            RunnerState::Errored
        };
        self.shared.set_state(next);
        let _ = self.shared.events.send(RunnerEvent::Exited { exit_code });

        info!(session_id = %self.label, exit_code = ?exit_code, state = ?next, "process exited");
    }

    fn shutdown(&mut self) {
        self.kill();

        if let Some(flight) = self.in_flight.take() {
            let _ = flight
                .command
                .sink
                .send(Err(SessionError::CommandExecutionFailed { exit_code: None }));
        }
        self.fail_queued();

        self.shared.set_state(RunnerState::Disconnected);
        info!(session_id = %self.label, "session stopped");
    }

    fn fail_queued(&mut self) {
        for command in self.queue.drain(..) {
            let _ = command.sink.send(Err(SessionError::NotRunning(self.label.clone())));
        }
    }

    fn append(&mut self, chunk: &str) {
        trace!(session_id = %self.label, bytes = chunk.len(), "output received");
        self.shared.buffer().push_str(chunk);
        let _ = self.shared.events.send(RunnerEvent::Output(chunk.to_string()));
    }

    fn kill(&mut self) {
        if let Err(e) = self.channel.kill() {
            warn!(session_id = %self.label, error = %e, "failed to kill process");
        }
    }
}
