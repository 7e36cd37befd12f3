//! `OpenAI`-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::digest::core::config::{LlmConfig, MAX_BACKOFF_SHIFT};
use crate::digest::core::errors::DigestResult;
use crate::llm::provider::{CompletionProvider, CompletionRequest, ProviderError};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

impl<'a> ChatCompletionBody<'a> {
    fn from_request(request: &'a CompletionRequest) -> Self {
        Self {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
            response_format: request.json_response.then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatCompletionResponse {
    fn into_content(self) -> Result<String, ProviderError> {
        self.choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("response has no choices".to_string()))?
            .message
            .content
            .ok_or_else(|| ProviderError::Malformed("first choice has no content".to_string()))
    }
}

/// Async client for `/v1/chat/completions` style endpoints.
///
/// `llm.timeout_secs` bounds each attempt; retries are spent only on
/// transport failures, timeouts, 429 and 5xx answers.
pub struct OpenAiClient {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    max_retries: u32,
    retry_delay: Duration,
}

impl OpenAiClient {
    /// Create a client from the completion settings.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> DigestResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(config.timeout())
            .build()?;

        if config.api_key.is_none() {
            warn!("No API key configured for {}; requests will be sent unauthenticated", config.api_url);
        }

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    async fn send_once(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let body = ChatCompletionBody::from_request(request);
        let mut builder = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::status(status.as_u16(), &text));
        }

        let envelope: ChatCompletionResponse = response.json().await?;
        envelope.into_content()
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let mut attempt = 0_u32;
        loop {
            debug!(model = %request.model, attempt, "Sending completion request");
            match self.send_once(&request).await {
                Ok(content) => return Ok(content),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = backoff_delay(self.retry_delay, attempt);
                    warn!("Completion attempt {} failed: {err}; retrying in {delay:?}", attempt + 1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Exponential backoff with up to 50% random jitter.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let scaled = base.saturating_mul(1_u32 << attempt.min(MAX_BACKOFF_SHIFT));
    let jitter_ceiling = u64::try_from(scaled.as_millis() / 2).unwrap_or(u64::MAX);
    let jitter = if jitter_ceiling == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_ceiling)
    };
    scaled.saturating_add(Duration::from_millis(jitter))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::extract::State;
    use axum::http::header::AUTHORIZATION;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;

    use super::*;

    fn request(json_response: bool) -> CompletionRequest {
        CompletionRequest {
            system_prompt: "sys".to_string(),
            user_prompt: "user".to_string(),
            model: "gpt-4".to_string(),
            temperature: 0.5,
            json_response,
        }
    }

    #[test]
    fn test_body_shape() {
        let req = request(true);
        let body = serde_json::to_value(ChatCompletionBody::from_request(&req)).unwrap_or_default();
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "sys");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "user");
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_body_omits_response_format_for_text() {
        let req = request(false);
        let body = serde_json::to_value(ChatCompletionBody::from_request(&req)).unwrap_or_default();
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_envelope_content_extraction() {
        let raw = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"hola"}}]}"#;
        let envelope: Result<ChatCompletionResponse, _> = serde_json::from_str(raw);
        let content = envelope.map_err(|e| e.to_string()).and_then(|e| e.into_content().map_err(|e| e.to_string()));
        assert_eq!(content.as_deref(), Ok("hola"));
    }

    #[test]
    fn test_envelope_without_choices_is_malformed() {
        let envelope: Result<ChatCompletionResponse, _> = serde_json::from_str(r#"{"error":"boom"}"#);
        let Ok(envelope) = envelope else {
            panic!("envelope should decode");
        };
        assert!(matches!(envelope.into_content(), Err(ProviderError::Malformed(_))));
    }

    #[test]
    fn test_backoff_grows_and_stays_bounded() {
        let base = Duration::from_millis(100);
        let first = backoff_delay(base, 0);
        assert!(first >= base && first <= Duration::from_millis(150));
        let third = backoff_delay(base, 2);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(600));
        let huge = backoff_delay(base, 40);
        assert!(huge <= Duration::from_millis(100 * 32 * 3 / 2));
        assert_eq!(backoff_delay(Duration::ZERO, 3), Duration::ZERO);
    }

    #[test]
    fn test_client_builds_from_default_config() {
        assert!(OpenAiClient::new(&LlmConfig::default()).is_ok());
    }

    #[test]
    fn test_default_request_has_no_response_format() {
        let config = LlmConfig::default();
        let req = CompletionRequest {
            json_response: config.json_mode,
            ..request(false)
        };
        let body = serde_json::to_value(ChatCompletionBody::from_request(&req)).unwrap_or_default();
        assert!(body.get("response_format").is_none());
    }

    const OK_BODY: &str = r#"{"choices":[{"message":{"role":"assistant","content":"hola"}}]}"#;

    /// Canned answers served in order; the last one repeats.
    #[derive(Clone)]
    struct Script {
        replies: Arc<Vec<(u16, &'static str, u64)>>,
        hits: Arc<AtomicUsize>,
        authorization: Arc<Mutex<Option<String>>>,
    }

    async fn scripted_reply(
        State(script): State<Script>,
        headers: HeaderMap,
    ) -> (StatusCode, String) {
        let hit = script.hits.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut slot) = script.authorization.lock() {
            *slot = headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
        }

        let (status, body, delay_ms) = script
            .replies
            .get(hit)
            .or_else(|| script.replies.last())
            .copied()
            .unwrap_or((500, "no reply", 0));
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body.to_string(),
        )
    }

    async fn serve(replies: Vec<(u16, &'static str, u64)>) -> (String, Script) {
        let script = Script {
            replies: Arc::new(replies),
            hits: Arc::new(AtomicUsize::new(0)),
            authorization: Arc::new(Mutex::new(None)),
        };
        let app = Router::new()
            .route("/v1/chat/completions", post(scripted_reply))
            .with_state(script.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|err| panic!("bind failed: {err}"));
        let addr = listener
            .local_addr()
            .unwrap_or_else(|err| panic!("no local addr: {err}"));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        (format!("http://{addr}/v1/chat/completions"), script)
    }

    fn client(api_url: String, max_retries: u32) -> OpenAiClient {
        let config = LlmConfig {
            api_url,
            api_key: Some("sk-test".to_string()),
            timeout_secs: 1,
            max_retries,
            retry_delay_ms: 1,
            ..LlmConfig::default()
        };
        OpenAiClient::new(&config).unwrap_or_else(|err| panic!("client should build: {err}"))
    }

    #[tokio::test]
    async fn test_success_returns_content_with_bearer_auth() {
        let (url, script) = serve(vec![(200, OK_BODY, 0)]).await;
        let answer = client(url, 0).complete(request(false)).await;
        assert_eq!(answer.ok().as_deref(), Some("hola"));
        let sent = script.authorization.lock().ok().and_then(|slot| slot.clone());
        assert_eq!(sent.as_deref(), Some("Bearer sk-test"));
    }

    #[tokio::test]
    async fn test_client_error_status_is_not_retried() {
        let (url, script) = serve(vec![(401, "invalid key", 0)]).await;
        let answer = client(url, 2).complete(request(false)).await;
        assert!(matches!(
            answer,
            Err(ProviderError::Status { status: 401, ref body }) if body == "invalid key"
        ));
        assert_eq!(script.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_retried_until_success() {
        let (url, script) = serve(vec![(503, "busy", 0), (200, OK_BODY, 0)]).await;
        let answer = client(url, 2).complete(request(false)).await;
        assert_eq!(answer.ok().as_deref(), Some("hola"));
        assert_eq!(script.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_retries_stop_at_limit() {
        let (url, script) = serve(vec![(429, "slow down", 0)]).await;
        let answer = client(url, 2).complete(request(false)).await;
        assert!(matches!(answer, Err(ProviderError::Status { status: 429, .. })));
        assert_eq!(script.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_undecodable_envelope_is_malformed() {
        let (url, script) = serve(vec![(200, "not json", 0)]).await;
        let answer = client(url, 2).complete(request(false)).await;
        assert!(matches!(answer, Err(ProviderError::Malformed(_))));
        assert_eq!(script.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timed_out_attempt_is_retried() {
        let (url, script) = serve(vec![(200, OK_BODY, 3_000), (200, OK_BODY, 0)]).await;
        let answer = client(url, 1).complete(request(false)).await;
        assert_eq!(answer.ok().as_deref(), Some("hola"));
        assert_eq!(script.hits.load(Ordering::SeqCst), 2);
    }
}
