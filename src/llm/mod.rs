//! Completion provider layer.
//!
//! - `provider`: the `CompletionProvider` trait and its error type
//! - `openai`: `OpenAI`-compatible chat completions client

pub mod openai;
pub mod provider;

pub use openai::OpenAiClient;
pub use provider::{CompletionProvider, CompletionRequest, ProviderError};
