//! Summary results and decoding of provider answers.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Summary text stored when the provider could not be reached or refused the call.
pub const PROVIDER_FAILURE_SUMMARY: &str = "Error consultando IA";
/// Summary text stored when the provider answer could not be decoded.
pub const PARSE_FAILURE_SUMMARY: &str = "Error procesando respuesta IA";

/// A suggested interactive prompt extracted from the conversation.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Cta {
    /// Question to ask the group.
    pub question: String,
    /// Answer options.
    #[serde(default, deserialize_with = "text_items")]
    pub options: Vec<String>,
}

/// Structured output derived from one conversation.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    /// Free-text summary, or a failure marker when degraded.
    pub summary: String,
    /// Things students must bring.
    #[serde(default)]
    pub things_to_bring: Vec<String>,
    /// Upcoming activities and dates.
    #[serde(default)]
    pub upcoming_dates: Vec<String>,
    /// Suggested calls to action.
    #[serde(default)]
    pub cta: Vec<Cta>,
    /// Diagnostic, present only when the pipeline degraded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SummaryResult {
    /// Wrap free text as a summary with empty lists.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            summary: text.into(),
            ..Self::default()
        }
    }

    /// Degraded result for provider failures (transport, timeout, status).
    #[must_use]
    pub fn provider_failure(diagnostic: impl Into<String>) -> Self {
        Self {
            summary: PROVIDER_FAILURE_SUMMARY.to_string(),
            error: Some(diagnostic.into()),
            ..Self::default()
        }
    }

    /// Degraded result for undecodable provider answers.
    #[must_use]
    pub fn parse_failure(diagnostic: impl Into<String>) -> Self {
        Self {
            summary: PARSE_FAILURE_SUMMARY.to_string(),
            error: Some(diagnostic.into()),
            ..Self::default()
        }
    }

    /// Whether this result encodes a failure.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Outcome of looking up a task identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskLookup {
    /// The task exists.
    Found(SummaryResult),
    /// No task was ever stored under this identifier.
    NotFound,
}

/// The provider answer was not a usable summary object.
#[derive(Debug, Error)]
#[error("could not decode summary: {0}")]
pub struct ResponseParseError(#[from] serde_json::Error);

/// Payload the model is asked to produce in structured mode.
#[derive(Deserialize)]
struct StructuredPayload {
    summary: String,
    #[serde(default, deserialize_with = "text_items")]
    things_to_bring: Vec<String>,
    #[serde(default, deserialize_with = "text_items")]
    upcoming_dates: Vec<String>,
    #[serde(default, deserialize_with = "cta_items")]
    cta: Vec<Cta>,
}

/// Decode a structured provider answer.
///
/// The text is decoded as JSON data only. A surrounding markdown code fence
/// is tolerated; anything else that is not a JSON object with a string
/// `summary` is rejected.
///
/// # Errors
/// Returns [`ResponseParseError`] when the answer is not a valid summary object.
pub fn parse_structured(raw: &str) -> Result<SummaryResult, ResponseParseError> {
    let payload: StructuredPayload = serde_json::from_str(strip_code_fence(raw))?;
    Ok(SummaryResult {
        summary: payload.summary,
        things_to_bring: payload.things_to_bring,
        upcoming_dates: payload.upcoming_dates,
        cta: payload.cta,
        error: None,
    })
}

/// Remove a surrounding markdown code fence, with or without an info string
/// such as `json`, on one line or several.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(fenced) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = fenced.strip_suffix("```").unwrap_or(fenced);
    let body = match inner.split_once('\n') {
        Some((info, rest)) if !info.trim_start().starts_with(['{', '[']) => rest,
        _ => inner.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim()
}

/// Render a scalar or flat object as one list entry.
fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Object(map) => {
            let parts: Vec<String> = map.into_iter().filter_map(|(_, v)| value_to_text(v)).collect();
            (!parts.is_empty()).then(|| parts.join(" - "))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.into_iter().filter_map(value_to_text).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
    }
}

/// Accept a list whose entries may be strings, numbers or small objects.
fn text_items<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(items.into_iter().filter_map(value_to_text).collect())
}

/// Accept a single CTA object as well as a list of them.
fn cta_items<'de, D>(deserializer: D) -> Result<Vec<Cta>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<Cta>),
        One(Cta),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::Many(items)) => items,
        Some(OneOrMany::One(item)) => vec![item],
        None => Vec::new(),
    })
}
