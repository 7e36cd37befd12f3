//! Summarization pipeline: store, format, complete, parse, persist.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::digest::core::config::{DigestConfig, ResponseMode, SanitizeMode};
use crate::digest::core::errors::DigestResult;
use crate::digest::core::ids::TaskId;
use crate::digest::ingest::conversation::Conversation;
use crate::digest::ingest::transcript::format_transcript;
use crate::digest::storage::kv_store::{InMemoryStore, KeyValueStore};
use crate::digest::summarization::result::{SummaryResult, TaskLookup, parse_structured};
use crate::llm::provider::{CompletionProvider, CompletionRequest, ProviderError};
use crate::notify::whatsapp::Notifier;

/// System instruction sent with every completion.
pub const SYSTEM_PROMPT: &str = "Eres un asistente escolar que resume conversaciones de grupos de \
padres y madres de familia y extrae las acciones clave.";

/// Instructions prepended to the transcript in structured mode.
const STRUCTURED_INSTRUCTIONS: &str = r"Actua como un asistente virtual para un grupo de WhatsApp de padres y madres de familia del colegio.

1. Resume brevemente el tema principal de la conversacion.
2. Enumera tareas o cosas que deben traer los estudiantes.
3. Menciona actividades proximas y fechas importantes.
4. Senala preguntas o dudas abiertas.
5. Si corresponde, sugiere un CTA interactivo como una encuesta o confirmacion.

Responde solo con un objeto JSON con las siguientes claves:
summary (texto), things_to_bring (lista de textos), upcoming_dates (lista de textos),
cta (lista de objetos con question y options).";

/// Backend stores for the pipeline.
pub struct PipelineBackends {
    /// Conversations keyed by caller-supplied id.
    pub conversations: Arc<dyn KeyValueStore<String, Conversation>>,
    /// Summary results keyed by task id.
    pub results: Arc<dyn KeyValueStore<TaskId, SummaryResult>>,
}

impl PipelineBackends {
    /// Volatile, process-lifetime backends.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            conversations: Arc::new(InMemoryStore::new()),
            results: Arc::new(InMemoryStore::new()),
        }
    }
}

/// Response to a submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Submission {
    /// Identifier to poll with.
    pub task_id: TaskId,
    /// Stored result.
    pub summary: SummaryResult,
}

/// Orchestrates one conversation into one stored summary task.
///
/// Each mapping locks per key only; the admission gate bounds provider calls
/// and never blocks stores or reads.
pub struct SummaryPipeline {
    provider: Arc<dyn CompletionProvider>,
    notifier: Option<Arc<dyn Notifier>>,
    conversations: Arc<dyn KeyValueStore<String, Conversation>>,
    results: Arc<dyn KeyValueStore<TaskId, SummaryResult>>,
    admission: Semaphore,
    model: String,
    temperature: f64,
    response_mode: ResponseMode,
    json_mode: bool,
    sanitize: SanitizeMode,
    timeout: Duration,
    notify_target: Option<String>,
}

impl SummaryPipeline {
    /// Create a pipeline.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: &DigestConfig,
        provider: Arc<dyn CompletionProvider>,
        notifier: Option<Arc<dyn Notifier>>,
        backends: PipelineBackends,
    ) -> DigestResult<Self> {
        config.validate()?;

        Ok(Self {
            provider,
            notifier,
            conversations: backends.conversations,
            results: backends.results,
            admission: Semaphore::new(config.pipeline.max_concurrent_requests),
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            response_mode: config.llm.response_mode,
            json_mode: config.llm.json_mode,
            sanitize: config.transcript.sanitize,
            timeout: config.llm.call_budget(),
            notify_target: config.notifier.target.clone(),
        })
    }

    /// Override the bound on a whole provider call, retries included.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Summarize a conversation and store the result under a new task id.
    ///
    /// Provider and decoding failures do not fail the submission: they are
    /// stored as a degraded [`SummaryResult`].
    ///
    /// # Errors
    /// Returns an error if the conversation is invalid or a store rejects a write.
    pub async fn submit(&self, conversation: Conversation) -> DigestResult<Submission> {
        conversation.validate()?;

        let transcript = format_transcript(&conversation, self.sanitize);
        let conversation_id = conversation.conversation_id.clone();
        let group_name = conversation.group_name.clone();
        let message_count = conversation.messages.len();

        self.conversations
            .put(conversation_id.clone(), conversation)
            .await?;
        debug!("Stored conversation {conversation_id} ({message_count} messages)");

        let summary = self.summarize(&transcript).await;

        let task_id = TaskId::new();
        self.results.put(task_id, summary.clone()).await?;

        if let Some(error) = &summary.error {
            warn!("Stored degraded summary task {task_id} for conversation {conversation_id}: {error}");
        } else {
            info!("Stored summary task {task_id} for conversation {conversation_id}");
        }

        self.dispatch_notifications(&group_name, &summary);

        Ok(Submission { task_id, summary })
    }

    /// Look up a task by its textual identifier.
    ///
    /// Unknown and malformed identifiers yield [`TaskLookup::NotFound`].
    ///
    /// # Errors
    /// Returns an error only if the backing store fails.
    pub async fn retrieve(&self, task_id: &str) -> DigestResult<TaskLookup> {
        match TaskId::parse_lenient(task_id) {
            Some(id) => self.retrieve_id(id).await,
            None => Ok(TaskLookup::NotFound),
        }
    }

    /// Look up a task by identifier.
    ///
    /// # Errors
    /// Returns an error only if the backing store fails.
    pub async fn retrieve_id(&self, task_id: TaskId) -> DigestResult<TaskLookup> {
        Ok(self
            .results
            .get(task_id)
            .await?
            .map_or(TaskLookup::NotFound, TaskLookup::Found))
    }

    /// Fetch the last stored conversation for a caller-supplied id.
    ///
    /// # Errors
    /// Returns an error only if the backing store fails.
    pub async fn conversation(&self, conversation_id: &str) -> DigestResult<Option<Conversation>> {
        self.conversations.get(conversation_id.to_string()).await
    }

    fn build_request(&self, transcript: &str) -> CompletionRequest {
        let user_prompt = match self.response_mode {
            ResponseMode::Structured => format!("{STRUCTURED_INSTRUCTIONS}\n\n{transcript}"),
            ResponseMode::FreeText => transcript.to_string(),
        };

        CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt,
            model: self.model.clone(),
            temperature: self.temperature,
            json_response: self.json_mode && self.response_mode == ResponseMode::Structured,
        }
    }

    async fn call_provider(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let _permit = self
            .admission
            .acquire()
            .await
            .map_err(|err| ProviderError::Transport(format!("admission gate closed: {err}")))?;

        tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .unwrap_or(Err(ProviderError::Timeout))
    }

    async fn summarize(&self, transcript: &str) -> SummaryResult {
        let request = self.build_request(transcript);
        debug!(
            "Requesting {} completion from {} ({} chars)",
            self.response_mode,
            request.model,
            request.user_prompt.len()
        );

        let text = match self.call_provider(request).await {
            Ok(text) => text,
            Err(err) => {
                warn!("Completion provider failed: {err}");
                return SummaryResult::provider_failure(err.to_string());
            }
        };

        match self.response_mode {
            ResponseMode::FreeText => SummaryResult::from_text(text),
            ResponseMode::Structured => parse_structured(&text).unwrap_or_else(|err| {
                warn!("Provider answer is not a summary object: {err}");
                SummaryResult::parse_failure(err.to_string())
            }),
        }
    }

    /// Send every CTA on a detached task; failures are logged and skipped.
    fn dispatch_notifications(&self, group_name: &str, summary: &SummaryResult) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if summary.cta.is_empty() {
            return;
        }

        let notifier = Arc::clone(notifier);
        let target = self
            .notify_target
            .clone()
            .unwrap_or_else(|| group_name.to_string());
        let ctas = summary.cta.clone();

        tokio::spawn(async move {
            for cta in ctas {
                match notifier.notify(&target, &cta.question, &cta.options).await {
                    Ok(()) => debug!("Sent call to action `{}` to {target}", cta.question),
                    Err(err) => warn!("Failed to send call to action `{}`: {err}", cta.question),
                }
            }
        });
    }
}
