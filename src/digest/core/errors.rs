//! Error types for the digest subsystem.

use thiserror::Error;

/// Digest subsystem error type.
#[derive(Debug, Error)]
pub enum DigestError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Submitted conversation failed validation.
    #[error("invalid conversation: {0}")]
    InvalidConversation(String),
    /// HTTP client construction error.
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

/// Convenience result alias for digest operations.
pub type DigestResult<T> = Result<T, DigestError>;
