//! Conversation model for submitted group chats.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::digest::core::errors::{DigestError, DigestResult};

/// Display format for message timestamps inside transcripts.
pub const TRANSCRIPT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// A single chat utterance.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Sender identity.
    pub sender: String,
    /// Wall-clock time the message was sent.
    #[serde(with = "flexible_timestamp")]
    pub timestamp: NaiveDateTime,
    /// Message body.
    pub text: String,
}

impl Message {
    /// Build a message.
    #[must_use]
    pub fn new(sender: impl Into<String>, timestamp: NaiveDateTime, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            timestamp,
            text: text.into(),
        }
    }

    /// Timestamp rendered as `YYYY-MM-DD HH:MM`.
    #[must_use]
    pub fn timestamp_label(&self) -> String {
        self.timestamp.format(TRANSCRIPT_TIMESTAMP_FORMAT).to_string()
    }
}

/// One submitted batch of chat messages plus group metadata.
///
/// Messages keep the caller's order; nothing here sorts them.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Caller-supplied key; a later submission with the same key replaces this one.
    #[serde(rename = "chat_id", alias = "conversation_id")]
    pub conversation_id: String,
    /// Display label of the group.
    pub group_name: String,
    /// Participants in display order, duplicates included.
    #[serde(default)]
    pub participants: Vec<String>,
    /// Messages in submission order.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Build a conversation.
    #[must_use]
    pub fn new(
        conversation_id: impl Into<String>,
        group_name: impl Into<String>,
        participants: Vec<String>,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            group_name: group_name.into(),
            participants,
            messages,
        }
    }

    /// Check the invariants callers must uphold before submission.
    ///
    /// # Errors
    /// Returns an error when the key is blank or a message has no sender.
    pub fn validate(&self) -> DigestResult<()> {
        if self.conversation_id.trim().is_empty() {
            return Err(DigestError::InvalidConversation(
                "chat_id must not be empty".to_string(),
            ));
        }

        if let Some(index) = self
            .messages
            .iter()
            .position(|message| message.sender.trim().is_empty())
        {
            return Err(DigestError::InvalidConversation(format!(
                "message {index} has an empty sender"
            )));
        }

        Ok(())
    }
}

/// Serde adapter accepting the timestamp shapes chat exporters produce.
///
/// Accepts RFC 3339 (kept as the sender's wall-clock time), naive ISO-8601,
/// `YYYY-MM-DD HH:MM[:SS]` and unix seconds. Always writes `YYYY-MM-DDTHH:MM:SS`.
pub mod flexible_timestamp {
    use chrono::{DateTime, NaiveDateTime};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    const OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    const NAIVE_FORMATS: [&str; 6] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Text(String),
        Unix(i64),
    }

    /// Parse a textual timestamp.
    #[must_use]
    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.naive_local());
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
    }

    /// Serialize as `YYYY-MM-DDTHH:MM:SS`.
    ///
    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(OUTPUT_FORMAT))
    }

    /// Deserialize from any supported shape.
    ///
    /// # Errors
    /// Fails on unsupported text or out-of-range unix seconds.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawTimestamp::deserialize(deserializer)? {
            RawTimestamp::Text(text) => parse(&text)
                .ok_or_else(|| D::Error::custom(format!("unsupported timestamp `{text}`"))),
            RawTimestamp::Unix(seconds) => DateTime::from_timestamp(seconds, 0)
                .as_ref().map(DateTime::naive_utc)
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {seconds}"))),
        }
    }
}
