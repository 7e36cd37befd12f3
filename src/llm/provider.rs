//! Completion provider abstraction.

use async_trait::async_trait;
use thiserror::Error;

/// Longest provider body kept in diagnostics.
const MAX_BODY_CHARS: usize = 200;

/// Errors raised while talking to a completion provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),
    /// Provider answered with a non-success status.
    #[error("provider returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
    /// The call did not finish in time.
    #[error("provider call timed out")]
    Timeout,
    /// Response envelope lacked the expected completion content.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Build a status error, truncating the body for logs and diagnostics.
    #[must_use]
    pub fn status(status: u16, body: &str) -> Self {
        Self::Status {
            status,
            body: body.chars().take(MAX_BODY_CHARS).collect(),
        }
    }

    /// Check if this error is worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else if value.is_decode() {
            Self::Malformed(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}

/// One completion call.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    /// System instruction.
    pub system_prompt: String,
    /// User content.
    pub user_prompt: String,
    /// Model name.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Ask the provider for a JSON object answer.
    pub json_response: bool,
}

/// Large-language-model completion service.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Run one completion and return the assistant text.
    ///
    /// # Errors
    /// Returns a [`ProviderError`] on transport failures, non-success statuses
    /// or an unusable response envelope.
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError>;
}
