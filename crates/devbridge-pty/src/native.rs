//! Native pseudo-terminal channels backed by `portable-pty`.

use std::io::{ErrorKind, Read, Write};
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::channel::{ChannelEvent, PtySpawner, SessionChannel, SpawnRequest, SpawnedChannel, Utf8Chunker};
use crate::{PtyError, Result};

/// How long the exit notifier waits for the reader to drain after the child exits.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Spawns processes on the host's native pseudo-terminal.
#[derive(Debug, Default, Clone)]
pub struct NativePtySpawner;

impl NativePtySpawner {
    /// Creates a native spawner.
    pub fn new() -> Self {
        Self
    }
}

impl PtySpawner for NativePtySpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedChannel> {
        debug!(command = %request.display_command(), cwd = ?request.cwd, "spawning pty process");

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: request.size.rows,
                cols: request.size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::spawn(&request.command, e))?;

        let mut builder = CommandBuilder::new(&request.command);
        for arg in &request.args {
            builder.arg(arg);
        }
        if let Some(cwd) = &request.cwd {
            builder.cwd(cwd);
        }
        builder.env("TERM", &request.term);
        for (key, value) in &request.env {
            builder.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| PtyError::spawn(&request.command, e))?;
        // The child holds its own copy of the slave; ours would keep the reader from seeing EOF.
        drop(pair.slave);

        let process_id = child.process_id();
        let killer = child.clone_killer();

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::spawn(&request.command, e))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::spawn(&request.command, e))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let reader_handle = tokio::task::spawn_blocking({
            let event_tx = event_tx.clone();
            move || pump_output(reader, event_tx)
        });

        let wait_handle = tokio::task::spawn_blocking(move || wait_exit(child));

        tokio::spawn(async move {
            let exit_code = wait_handle.await.unwrap_or(None);
            if tokio::time::timeout(DRAIN_GRACE, reader_handle).await.is_err() {
                trace!("pty reader still open after exit");
            }
            let _ = event_tx.send(ChannelEvent::Exit(exit_code));
        });

        let (write_tx, write_rx) = std_mpsc::channel::<Vec<u8>>();
        std::thread::spawn(move || pump_input(writer, write_rx));

        Ok(SpawnedChannel {
            channel: Box::new(NativeChannel {
                _master: pair.master,
                killer,
                write_tx: Some(write_tx),
                process_id,
                killed: false,
            }),
            events: event_rx,
        })
    }
}

/// A live process on a native pseudo-terminal.
struct NativeChannel {
    // Dropping the master closes the terminal, so it lives as long as the channel.
    _master: Box<dyn MasterPty + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    write_tx: Option<std_mpsc::Sender<Vec<u8>>>,
    process_id: Option<u32>,
    killed: bool,
}

impl SessionChannel for NativeChannel {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let tx = self.write_tx.as_ref().ok_or(PtyError::Closed)?;
        tx.send(data.to_vec()).map_err(|_| PtyError::Closed)
    }

    fn kill(&mut self) -> Result<()> {
        if self.killed {
            return Ok(());
        }
        self.killed = true;
        self.write_tx = None;

        match self.killer.kill() {
            Ok(()) => Ok(()),
            // Already reaped.
            Err(e) if e.kind() == ErrorKind::InvalidInput || e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PtyError::Io(e)),
        }
    }

    fn process_id(&self) -> Option<u32> {
        self.process_id
    }
}

impl Drop for NativeChannel {
    fn drop(&mut self) {
        if let Err(e) = self.kill() {
            warn!(error = %e, "failed to kill pty process on drop");
        }
    }
}

fn pump_output(mut reader: Box<dyn Read + Send>, tx: mpsc::UnboundedSender<ChannelEvent>) {
    let mut chunker = Utf8Chunker::new();
    let mut buf = [0u8; 8192];

    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let text = chunker.push(&buf[..n]);
                if !text.is_empty() && tx.send(ChannelEvent::Output(text)).is_err() {
                    return;
                }
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(5));
            }
            // EIO once the child side closes.
            Err(e) => {
                trace!(error = %e, "pty read ended");
                break;
            }
        }
    }

    let rest = chunker.finish();
    if !rest.is_empty() {
        let _ = tx.send(ChannelEvent::Output(rest));
    }
}

fn pump_input(mut writer: Box<dyn Write + Send>, rx: std_mpsc::Receiver<Vec<u8>>) {
    while let Ok(bytes) = rx.recv() {
        if let Err(e) = writer.write_all(&bytes).and_then(|()| writer.flush()) {
            debug!(error = %e, "pty write failed");
            break;
        }
    }
}

fn wait_exit(mut child: Box<dyn Child + Send + Sync>) -> Option<i32> {
    match child.wait() {
        Ok(status) => Some(status.exit_code() as i32),
        Err(e) => {
            warn!(error = %e, "failed to wait for pty process");
            None
        }
    }
}
