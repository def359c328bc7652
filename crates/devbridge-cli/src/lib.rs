//! devbridge CLI library.
//!
//! This crate provides the `devbridge` command-line interface over the
//! session runtime: one-shot runs, scripted execution in a shell session,
//! and an interactive shell REPL.

pub mod cli;
pub mod commands;
pub mod config;
pub mod repl;
