//! Provider-agnostic building blocks for MUSE image-edit jobs.
//!
//! Holds the job data model shared by the Replicate client and the
//! scenario harness, plus the small pure helpers around it: media-type
//! sniffing, the scenario catalog, and chat-transcript image extraction.

pub mod catalog;
pub mod error;
pub mod job;
pub mod media;
pub mod transcript;
