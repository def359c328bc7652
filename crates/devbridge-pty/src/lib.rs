//! Pseudo-terminal session channels for devbridge.
//!
//! This crate provides the process primitive the session runtime drives:
//! - Spawn a command attached to a pseudo-terminal
//! - Write raw input to it
//! - Stream its output as UTF-8 chunks
//! - Report its exit code once
//! - Kill it
//!
//! # Example
//!
//! ```no_run
//! use devbridge_pty::{ChannelEvent, NativePtySpawner, PtySpawner, SpawnRequest};
//!
//! # async fn demo() -> devbridge_pty::Result<()> {
//! let spawner = NativePtySpawner::new();
//! let request = SpawnRequest::new("bash").with_cwd("/tmp");
//! let mut spawned = spawner.spawn(&request)?;
//!
//! spawned.channel.write(b"echo hello\n")?;
//! while let Some(event) = spawned.events.recv().await {
//!     match event {
//!         ChannelEvent::Output(chunk) => print!("{}", chunk),
//!         ChannelEvent::Exit(code) => println!("exited: {:?}", code),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! Enable the `mock` feature for [`MockPtySpawner`], an in-process spawner
//! whose terminals are driven by the test.

pub mod channel;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod native;

pub use channel::{
    ChannelEvent, PtySpawner, SessionChannel, SpawnRequest, SpawnedChannel, TerminalSize, Utf8Chunker,
    DEFAULT_TERM,
};
pub use error::{PtyError, Result};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockPtySpawner, MockTerminal};
pub use native::NativePtySpawner;
