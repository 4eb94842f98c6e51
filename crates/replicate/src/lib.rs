//! Replicate prediction client for MUSE image edits.
//!
//! Provides the REST transport for Replicate's prediction API, request
//! body construction, response normalization, and [`AsyncJobClient`],
//! which submits a prediction and polls it to a terminal
//! [`JobOutcome`](muse_core::job::JobOutcome) under a deadline.

pub mod api;
pub mod client;
pub mod config;
pub mod payload;
pub mod prediction;
pub mod progress;
pub mod transport;

pub use client::AsyncJobClient;
