//! Configuration for the digest service.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use url::Url;

use crate::digest::core::errors::{DigestError, DigestResult};

/// Default `OpenAI`-compatible chat completions endpoint.
pub const DEFAULT_LLM_URL: &str = "https://api.openai.com/v1/chat/completions";
/// Default `WhatsApp` Business Cloud API messages endpoint.
pub const DEFAULT_WHATSAPP_URL: &str = "https://graph.facebook.com/v19.0/me/messages";
/// Cap on the exponential backoff multiplier between provider retries.
pub const MAX_BACKOFF_SHIFT: u32 = 5;
/// Highest accepted `llm.max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Top-level configuration for the digest service.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DigestConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Completion provider settings.
    pub llm: LlmConfig,
    /// Transcript formatting settings.
    pub transcript: TranscriptConfig,
    /// Pipeline admission settings.
    pub pipeline: PipelineConfig,
    /// Outbound notification settings.
    pub notifier: NotifierConfig,
}

impl DigestConfig {
    /// Build a configuration from the process environment.
    ///
    /// # Errors
    /// Returns an error if a variable holds an unparsable value or validation fails.
    pub fn from_env() -> DigestResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup, starting from defaults.
    ///
    /// Blank values are treated as unset.
    ///
    /// # Errors
    /// Returns an error if a value cannot be parsed or validation fails.
    pub fn from_lookup<F>(lookup: F) -> DigestResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        config.server.apply_env(&get)?;
        config.llm.apply_env(&get)?;
        if let Some(mode) = get("CHAT_DIGEST_SANITIZE") {
            config.transcript.sanitize = parse_var("CHAT_DIGEST_SANITIZE", &mode)?;
        }
        if let Some(max) = get("CHAT_DIGEST_MAX_CONCURRENT") {
            config.pipeline.max_concurrent_requests =
                parse_var("CHAT_DIGEST_MAX_CONCURRENT", &max)?;
        }
        config.notifier.apply_env(&get);

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> DigestResult<()> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be > 0"));
        }
        if self.server.max_body_bytes == 0 {
            return Err(invalid("server.max_body_bytes must be > 0"));
        }

        self.llm.validate()?;

        let permits = self.pipeline.max_concurrent_requests;
        if permits == 0 || permits > Semaphore::MAX_PERMITS {
            return Err(DigestError::InvalidConfig(format!(
                "pipeline.max_concurrent_requests must be within 1..={}, got {permits}",
                Semaphore::MAX_PERMITS
            )));
        }

        Url::parse(&self.notifier.api_url)?;

        Ok(())
    }
}

fn invalid(message: &str) -> DigestError {
    DigestError::InvalidConfig(message.to_string())
}

fn parse_var<T>(key: &str, raw: &str) -> DigestResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err| DigestError::InvalidConfig(format!("{key}={raw:?}: {err}")))
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
    /// Largest accepted request body, in bytes.
    pub max_body_bytes: usize,
}

impl ServerConfig {
    fn apply_env(&mut self, get: &impl Fn(&str) -> Option<String>) -> DigestResult<()> {
        if let Some(port) = get("CHAT_DIGEST_PORT") {
            self.port = parse_var("CHAT_DIGEST_PORT", &port)?;
        }
        if let Some(limit) = get("CHAT_DIGEST_MAX_BODY_BYTES") {
            self.max_body_bytes = parse_var("CHAT_DIGEST_MAX_BODY_BYTES", &limit)?;
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// How the provider is asked to answer and how its answer is decoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseMode {
    /// The model answers with a JSON object holding the summary fields.
    #[default]
    Structured,
    /// The model answers with prose, stored verbatim as the summary.
    FreeText,
}

impl ResponseMode {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::FreeText => "free-text",
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "structured" | "json" => Ok(Self::Structured),
            "free-text" | "free_text" | "text" => Ok(Self::FreeText),
            _ => Err(format!("unknown response mode `{value}`")),
        }
    }
}

/// Completion provider settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Chat completions endpoint.
    pub api_url: String,
    /// Bearer token for the provider.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model name.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Upper bound for one provider attempt, in seconds.
    pub timeout_secs: u64,
    /// Connection timeout, in seconds.
    pub connect_timeout_secs: u64,
    /// Retries performed by the provider client on retryable failures.
    pub max_retries: u32,
    /// Base delay between retries in milliseconds.
    pub retry_delay_ms: u64,
    /// Response decoding mode.
    pub response_mode: ResponseMode,
    /// Ask the provider for a JSON object answer (`response_format`) in
    /// structured mode. Only models with JSON mode accept it.
    pub json_mode: bool,
}

impl LlmConfig {
    /// Timeout of one provider attempt.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Upper bound for a whole provider call: every attempt plus the longest
    /// backoff before each retry.
    #[must_use]
    pub fn call_budget(&self) -> Duration {
        let base = Duration::from_millis(self.retry_delay_ms);
        (0..self.max_retries).fold(
            self.timeout().saturating_mul(self.max_retries.saturating_add(1)),
            |budget, attempt| {
                let delay = base.saturating_mul(1_u32 << attempt.min(MAX_BACKOFF_SHIFT));
                budget.saturating_add(delay.saturating_add(delay / 2))
            },
        )
    }

    fn apply_env(&mut self, get: &impl Fn(&str) -> Option<String>) -> DigestResult<()> {
        if let Some(url) = get("CHAT_DIGEST_LLM_URL") {
            self.api_url = url;
        }
        self.api_key = get("OPENAI_API_KEY");
        if let Some(model) = get("CHAT_DIGEST_MODEL") {
            self.model = model;
        }
        if let Some(temperature) = get("CHAT_DIGEST_TEMPERATURE") {
            self.temperature = parse_var("CHAT_DIGEST_TEMPERATURE", &temperature)?;
        }
        if let Some(timeout) = get("CHAT_DIGEST_LLM_TIMEOUT_SECS") {
            self.timeout_secs = parse_var("CHAT_DIGEST_LLM_TIMEOUT_SECS", &timeout)?;
        }
        if let Some(retries) = get("CHAT_DIGEST_LLM_MAX_RETRIES") {
            self.max_retries = parse_var("CHAT_DIGEST_LLM_MAX_RETRIES", &retries)?;
        }
        if let Some(mode) = get("CHAT_DIGEST_RESPONSE_MODE") {
            self.response_mode = parse_var("CHAT_DIGEST_RESPONSE_MODE", &mode)?;
        }
        if let Some(json_mode) = get("CHAT_DIGEST_LLM_JSON_MODE") {
            self.json_mode = parse_var("CHAT_DIGEST_LLM_JSON_MODE", &json_mode)?;
        }
        Ok(())
    }

    fn validate(&self) -> DigestResult<()> {
        if self.model.trim().is_empty() {
            return Err(invalid("llm.model must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(DigestError::InvalidConfig(format!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.timeout_secs == 0 {
            return Err(invalid("llm.timeout_secs must be > 0"));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(DigestError::InvalidConfig(format!(
                "llm.max_retries must be <= {MAX_RETRIES_LIMIT}, got {}",
                self.max_retries
            )));
        }
        Url::parse(&self.api_url)?;
        Ok(())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_LLM_URL.to_string(),
            api_key: None,
            model: "gpt-4".to_string(),
            temperature: 0.5,
            timeout_secs: 30,
            connect_timeout_secs: 10,
            max_retries: 0,
            retry_delay_ms: 1000,
            response_mode: ResponseMode::Structured,
            json_mode: false,
        }
    }
}

/// Text sanitization policy applied while formatting transcripts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SanitizeMode {
    /// Pass caller text through unchanged.
    Raw,
    /// Drop every character outside the ASCII range.
    #[default]
    AsciiOnly,
}

impl FromStr for SanitizeMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "ascii-only" | "ascii_only" | "ascii" => Ok(Self::AsciiOnly),
            _ => Err(format!("unknown sanitize mode `{value}`")),
        }
    }
}

/// Transcript formatting settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TranscriptConfig {
    /// Sanitization policy for caller-supplied text.
    pub sanitize: SanitizeMode,
}

/// Pipeline admission settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum provider calls in flight at once.
    pub max_concurrent_requests: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 8,
        }
    }
}

/// Outbound notification settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Messages endpoint of the `WhatsApp` Business Cloud API.
    pub api_url: String,
    /// Bearer token; notifications are disabled when absent.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Fixed recipient; falls back to the conversation's group name.
    pub target: Option<String>,
    /// Request timeout, in seconds.
    pub timeout_secs: u64,
}

impl NotifierConfig {
    /// Whether outbound notifications should be sent at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    fn apply_env(&mut self, get: &impl Fn(&str) -> Option<String>) {
        self.token = get("WHATSAPP_TOKEN");
        if let Some(url) = get("WHATSAPP_API_URL") {
            self.api_url = url;
        }
        self.target = get("WHATSAPP_TARGET");
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_WHATSAPP_URL.to_string(),
            token: None,
            target: None,
            timeout_secs: 10,
        }
    }
}
