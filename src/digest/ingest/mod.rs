//! Ingestion of submitted conversations and transcript formatting.

pub mod conversation;
pub mod transcript;

pub use conversation::{Conversation, Message, TRANSCRIPT_TIMESTAMP_FORMAT};
pub use transcript::{format_transcript, sanitize};
