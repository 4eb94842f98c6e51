//! `muse` harness library crate.
//!
//! Re-exports internal modules for integration testing. The binary
//! entrypoint lives in `main.rs`.

pub mod cli;
pub mod commands;
pub mod error;
pub mod report;
pub mod runner;
pub mod settings;
pub mod sink;
