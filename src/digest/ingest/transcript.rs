//! Transcript formatting for completion prompts.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::digest::core::config::SanitizeMode;
use crate::digest::ingest::conversation::Conversation;

/// Label preceding the group name.
const GROUP_LABEL: &str = "Grupo";
/// Label preceding the participant list.
const PARTICIPANTS_LABEL: &str = "Participantes";
/// Label preceding the message lines.
const BODY_LABEL: &str = "Conversacion";

/// Apply the sanitization policy to caller-supplied text.
#[must_use]
pub fn sanitize(text: &str, mode: SanitizeMode) -> Cow<'_, str> {
    match mode {
        SanitizeMode::Raw => Cow::Borrowed(text),
        SanitizeMode::AsciiOnly if text.is_ascii() => Cow::Borrowed(text),
        SanitizeMode::AsciiOnly => Cow::Owned(text.chars().filter(char::is_ascii).collect()),
    }
}

/// Render a conversation as a prompt body.
///
/// Layout:
/// ```text
/// Grupo: <group>
/// Participantes: <a>, <b>
///
/// Conversacion:
/// [YYYY-MM-DD HH:MM] <sender>: <text>
/// ```
///
/// Messages are emitted in submission order. Output depends only on the input.
#[must_use]
pub fn format_transcript(conversation: &Conversation, mode: SanitizeMode) -> String {
    let participants = conversation
        .participants
        .iter()
        .map(|participant| sanitize(participant, mode))
        .collect::<Vec<_>>()
        .join(", ");

    let mut output = String::new();
    let _ = writeln!(
        output,
        "{GROUP_LABEL}: {}",
        sanitize(&conversation.group_name, mode)
    );
    let _ = writeln!(output, "{PARTICIPANTS_LABEL}: {participants}");
    output.push('\n');
    let _ = writeln!(output, "{BODY_LABEL}:");

    for message in &conversation.messages {
        let _ = writeln!(
            output,
            "[{}] {}: {}",
            message.timestamp_label(),
            sanitize(&message.sender, mode),
            sanitize(&message.text, mode)
        );
    }

    output
}
