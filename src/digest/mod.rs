//! Digest subsystem.
//!
//! Layout:
//! - `core`: configuration, errors, identifiers
//! - `ingest`: conversation model and transcript formatting
//! - `storage`: key-value backends for conversations and results
//! - `summarization`: answer decoding and the submission pipeline

pub mod core;
pub mod ingest;
pub mod storage;
pub mod summarization;

pub use core::{DigestConfig, DigestError, DigestResult, TaskId};
pub use ingest::{Conversation, Message};
pub use summarization::{Submission, SummaryPipeline, SummaryResult, TaskLookup};
