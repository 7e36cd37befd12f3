//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::digest::core::config::DigestConfig;
use crate::digest::core::errors::DigestResult;
use crate::digest::summarization::pipeline::{PipelineBackends, SummaryPipeline};
use crate::llm::openai::OpenAiClient;
use crate::notify::whatsapp::{Notifier, WhatsAppNotifier};

/// Shared application state.
pub struct AppState {
    /// Submission pipeline.
    pub pipeline: Arc<SummaryPipeline>,
}

impl AppState {
    /// Build the production state: `OpenAI`-compatible provider, optional
    /// `WhatsApp` notifier and in-memory stores.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or an HTTP client
    /// cannot be built.
    pub fn from_config(config: &DigestConfig) -> DigestResult<Arc<Self>> {
        let provider = Arc::new(OpenAiClient::new(&config.llm)?);
        let notifier = WhatsAppNotifier::from_config(&config.notifier)?
            .map(|n| Arc::new(n) as Arc<dyn Notifier>);

        if !config.notifier.is_enabled() {
            tracing::info!("WhatsApp token not set; call-to-action notifications disabled");
        }

        let pipeline =
            SummaryPipeline::new(config, provider, notifier, PipelineBackends::in_memory())?;
        Ok(Self::with_pipeline(pipeline))
    }

    /// Wrap an already-built pipeline.
    #[must_use]
    pub fn with_pipeline(pipeline: SummaryPipeline) -> Arc<Self> {
        Arc::new(Self {
            pipeline: Arc::new(pipeline),
        })
    }
}
