//! Core digest types: configuration, errors and identifiers.

pub mod config;
pub mod errors;
pub mod ids;

pub use config::{
    DigestConfig, LlmConfig, NotifierConfig, PipelineConfig, ResponseMode, SanitizeMode,
    ServerConfig, TranscriptConfig,
};
pub use errors::{DigestError, DigestResult};
pub use ids::TaskId;
