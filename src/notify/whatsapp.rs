//! `WhatsApp` Business Cloud API notifier for call-to-action prompts.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::digest::core::config::NotifierConfig;
use crate::digest::core::errors::DigestResult;

/// `WhatsApp` allows at most three reply buttons per interactive message.
pub const MAX_BUTTONS: usize = 3;
/// Maximum reply button title length, in characters.
pub const MAX_BUTTON_TITLE_CHARS: usize = 20;
/// Maximum interactive body length, in characters.
pub const MAX_BODY_CHARS: usize = 1024;

/// Errors raised while delivering a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Network failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Messaging API answered with a non-success status.
    #[error("messaging api returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
    /// The prompt cannot be expressed as an interactive message.
    #[error("invalid call to action: {0}")]
    InvalidCta(String),
}

/// Outbound channel for interactive prompts.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send one question with its answer options to `target`.
    ///
    /// # Errors
    /// Returns a [`NotificationError`] when delivery fails.
    async fn notify(
        &self,
        target: &str,
        question: &str,
        options: &[String],
    ) -> Result<(), NotificationError>;
}

#[derive(Debug, Serialize, PartialEq)]
struct InteractivePayload<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    interactive: Interactive,
}

#[derive(Debug, Serialize, PartialEq)]
struct Interactive {
    #[serde(rename = "type")]
    kind: &'static str,
    body: InteractiveBody,
    action: ButtonAction,
}

#[derive(Debug, Serialize, PartialEq)]
struct InteractiveBody {
    text: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct ButtonAction {
    buttons: Vec<Button>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Button {
    #[serde(rename = "type")]
    kind: &'static str,
    reply: Reply,
}

#[derive(Debug, Serialize, PartialEq)]
struct Reply {
    id: String,
    title: String,
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Build the interactive button message for one call to action.
fn build_payload<'a>(
    target: &'a str,
    question: &str,
    options: &[String],
) -> Result<InteractivePayload<'a>, NotificationError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(NotificationError::InvalidCta("question is empty".to_string()));
    }

    let mut seen = HashSet::new();
    let buttons: Vec<Button> = options
        .iter()
        .map(|option| option.trim())
        .filter(|option| !option.is_empty())
        .filter(|option| seen.insert(truncate_chars(option, MAX_BUTTON_TITLE_CHARS)))
        .take(MAX_BUTTONS)
        .map(|option| Button {
            kind: "reply",
            reply: Reply {
                id: option.to_string(),
                title: truncate_chars(option, MAX_BUTTON_TITLE_CHARS),
            },
        })
        .collect();

    if buttons.is_empty() {
        return Err(NotificationError::InvalidCta(format!(
            "no usable options for `{question}`"
        )));
    }

    Ok(InteractivePayload {
        messaging_product: "whatsapp",
        to: target,
        kind: "interactive",
        interactive: Interactive {
            kind: "button",
            body: InteractiveBody {
                text: truncate_chars(question, MAX_BODY_CHARS),
            },
            action: ButtonAction { buttons },
        },
    })
}

/// Notifier posting interactive button messages.
pub struct WhatsAppNotifier {
    client: Client,
    api_url: String,
    token: String,
}

impl WhatsAppNotifier {
    /// Create a notifier, or `None` when no token is configured.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &NotifierConfig) -> DigestResult<Option<Self>> {
        if !config.is_enabled() {
            return Ok(None);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Some(Self {
            client,
            api_url: config.api_url.clone(),
            token: config.token.clone().unwrap_or_default(),
        }))
    }
}

#[async_trait]
impl Notifier for WhatsAppNotifier {
    async fn notify(
        &self,
        target: &str,
        question: &str,
        options: &[String],
    ) -> Result<(), NotificationError> {
        let payload = build_payload(target, question, options)?;
        debug!(
            "Sending interactive prompt with {} buttons to {target}",
            payload.interactive.action.buttons.len()
        );

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
