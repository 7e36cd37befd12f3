//! End-to-end checks of the submission pipeline through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::routing::post;
use chat_digest::digest::core::config::{DigestConfig, SanitizeMode};
use chat_digest::digest::ingest::{Conversation, Message, format_transcript};
use chat_digest::digest::summarization::{
    PROVIDER_FAILURE_SUMMARY, PipelineBackends, SummaryPipeline, TaskLookup,
};
use chat_digest::llm::{CompletionProvider, CompletionRequest, OpenAiClient, ProviderError};
use chrono::NaiveDate;
use serde_json::Value;

struct Offline;

#[async_trait]
impl CompletionProvider for Offline {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, ProviderError> {
        Err(ProviderError::Transport("connection refused".to_string()))
    }
}

struct Canned;

#[async_trait]
impl CompletionProvider for Canned {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let bring = if request.user_prompt.contains("mochila") {
            vec!["mochila"]
        } else {
            Vec::new()
        };
        Ok(serde_json::json!({
            "summary": "Salida al museo el viernes",
            "things_to_bring": bring,
            "upcoming_dates": ["viernes 8: museo"],
            "cta": [{"question": "¿Autorizas la salida?", "options": ["Sí", "No"]}]
        })
        .to_string())
    }
}

fn sample() -> Conversation {
    let at = |h, m| {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .unwrap_or_default()
    };
    Conversation::new(
        "grupo-3a",
        "3ºA",
        vec!["Ana".to_string(), "Luis".to_string()],
        vec![
            Message::new("Ana", at(8, 5), "Hola"),
            Message::new("Luis", at(8, 7), "El viernes hay museo, traer mochila"),
        ],
    )
}

fn pipeline(provider: Arc<dyn CompletionProvider>) -> SummaryPipeline {
    match SummaryPipeline::new(
        &DigestConfig::default(),
        provider,
        None,
        PipelineBackends::in_memory(),
    ) {
        Ok(pipeline) => pipeline,
        Err(err) => panic!("pipeline should build: {err}"),
    }
}

#[test]
fn transcript_layout_in_raw_mode() {
    let text = format_transcript(&sample(), SanitizeMode::Raw);
    assert!(text.starts_with("Grupo: 3ºA\nParticipantes: Ana, Luis\n\n"));
    assert!(text.contains("[2024-03-01 08:05] Ana: Hola\n"));
    let ana = text.find("Ana: Hola").unwrap_or(usize::MAX);
    let luis = text.find("Luis: El viernes").unwrap_or(0);
    assert!(ana < luis);
}

#[tokio::test]
async fn structured_summary_roundtrip() {
    let pipeline = pipeline(Arc::new(Canned));
    let submission = match pipeline.submit(sample()).await {
        Ok(submission) => submission,
        Err(err) => panic!("submit failed: {err}"),
    };

    assert_eq!(submission.summary.things_to_bring, vec!["mochila"]);
    assert_eq!(submission.summary.cta[0].options, vec!["Sí", "No"]);

    let lookup = pipeline.retrieve(&submission.task_id.to_string()).await;
    assert!(matches!(lookup, Ok(TaskLookup::Found(ref r)) if *r == submission.summary));
}

#[tokio::test]
async fn offline_provider_degrades_and_is_retrievable() {
    let pipeline = pipeline(Arc::new(Offline));
    let submission = match pipeline.submit(sample()).await {
        Ok(submission) => submission,
        Err(err) => panic!("submit failed: {err}"),
    };

    assert_eq!(submission.summary.summary, PROVIDER_FAILURE_SUMMARY);
    assert!(submission.summary.things_to_bring.is_empty());
    assert!(submission.summary.error.is_some());

    let again = pipeline.retrieve_id(submission.task_id).await;
    assert!(matches!(again, Ok(TaskLookup::Found(r)) if r.summary == PROVIDER_FAILURE_SUMMARY));
    assert!(matches!(pipeline.retrieve("nonexistent").await, Ok(TaskLookup::NotFound)));
}

#[test]
fn conversation_wire_format() {
    let raw = r#"{
        "conversation_id": "c-1",
        "group_name": "4ºB",
        "messages": [{"sender": "Eva", "timestamp": "2024-03-01T08:05:00+01:00", "text": "ok"}]
    }"#;
    let conversation: Conversation = match serde_json::from_str(raw) {
        Ok(c) => c,
        Err(err) => panic!("conversation should decode: {err}"),
    };
    assert_eq!(conversation.conversation_id, "c-1");
    assert!(conversation.participants.is_empty());
    assert_eq!(conversation.messages[0].timestamp_label(), "2024-03-01 08:05");

    let json = serde_json::to_value(&conversation).unwrap_or_default();
    assert_eq!(json["chat_id"], "c-1");
}

/// Chat completions endpoint that stalls on its first request and records
/// every request body.
#[derive(Clone, Default)]
struct StallingEndpoint {
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Value>>>,
    stall_first: bool,
}

async fn completions(State(endpoint): State<StallingEndpoint>, body: String) -> String {
    let hit = endpoint.hits.fetch_add(1, Ordering::SeqCst);
    if let Ok(mut bodies) = endpoint.bodies.lock() {
        bodies.push(serde_json::from_str(&body).unwrap_or(Value::Null));
    }
    if endpoint.stall_first && hit == 0 {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    let answer = serde_json::json!({"summary": "Salida al museo"}).to_string();
    serde_json::json!({"choices": [{"message": {"role": "assistant", "content": answer}}]})
        .to_string()
}

async fn serve(endpoint: StallingEndpoint) -> String {
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(endpoint);
    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(err) => panic!("bind failed: {err}"),
    };
    let addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(err) => panic!("no local addr: {err}"),
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}/v1/chat/completions")
}

fn openai_pipeline(config: &DigestConfig) -> SummaryPipeline {
    let client = match OpenAiClient::new(&config.llm) {
        Ok(client) => client,
        Err(err) => panic!("client should build: {err}"),
    };
    match SummaryPipeline::new(config, Arc::new(client), None, PipelineBackends::in_memory()) {
        Ok(pipeline) => pipeline,
        Err(err) => panic!("pipeline should build: {err}"),
    }
}

#[tokio::test]
async fn default_config_request_is_plain_chat_completion() {
    let endpoint = StallingEndpoint::default();
    let mut config = DigestConfig::default();
    config.llm.api_url = serve(endpoint.clone()).await;

    let submission = match openai_pipeline(&config).submit(sample()).await {
        Ok(submission) => submission,
        Err(err) => panic!("submit failed: {err}"),
    };
    assert_eq!(submission.summary.summary, "Salida al museo");

    let bodies = endpoint.bodies.lock().map(|b| b.clone()).unwrap_or_default();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["model"], "gpt-4");
    assert_eq!(bodies[0]["temperature"], 0.5);
    assert!(bodies[0].get("response_format").is_none());
}

#[tokio::test]
async fn timed_out_attempt_is_retried_within_the_call_budget() {
    let endpoint = StallingEndpoint {
        stall_first: true,
        ..StallingEndpoint::default()
    };
    let mut config = DigestConfig::default();
    config.llm.api_url = serve(endpoint.clone()).await;
    config.llm.timeout_secs = 1;
    config.llm.max_retries = 2;
    config.llm.retry_delay_ms = 10;

    let submission = match openai_pipeline(&config).submit(sample()).await {
        Ok(submission) => submission,
        Err(err) => panic!("submit failed: {err}"),
    };
    assert_eq!(endpoint.hits.load(Ordering::SeqCst), 2);
    assert_eq!(submission.summary.summary, "Salida al museo");
    assert!(submission.summary.error.is_none());
}
