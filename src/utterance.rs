//! Chat events and the speakable utterances produced from them.
//!
//! Normalisation happens in a fixed order: links are replaced with a
//! placeholder, the body is cut to the configured number of characters, and
//! the author prefix is added last so it never counts against the limit.

use crate::constants::text::{LINK_PLACEHOLDER, UNKNOWN_AUTHOR};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

static LINK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("link pattern is valid")
});

/// Type tag of a chat event. Only text messages are spoken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEventKind {
    TextMessage,
    Other(String),
}

impl ChatEventKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "text_message" => ChatEventKind::TextMessage,
            other => ChatEventKind::Other(other.to_string()),
        }
    }
}

/// One record from the chat source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChatEvent {
    pub kind: ChatEventKind,
    pub author: String,
    pub body: String,
}

impl RawChatEvent {
    /// Convenience constructor for a plain text message.
    pub fn text(author: impl Into<String>, body: impl Into<String>) -> Self {
        RawChatEvent {
            kind: ChatEventKind::TextMessage,
            author: author.into(),
            body: body.into(),
        }
    }
}

/// Normalised text ready for the speech engine. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    text: String,
}

impl Utterance {
    /// Wrap `text`, rejecting blank input.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            None
        } else {
            Some(Utterance { text })
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// How chat events are turned into utterances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageFormat {
    pub max_length: usize,
    pub include_username: bool,
}

impl MessageFormat {
    /// Build the utterance for `event`, or `None` if it should not be spoken.
    pub fn utterance_for(&self, event: &RawChatEvent) -> Option<Utterance> {
        if event.kind != ChatEventKind::TextMessage {
            return None;
        }

        let body = replace_links(event.body.trim());
        let body = truncate_chars(&body, self.max_length).trim_end();
        if body.is_empty() {
            return None;
        }

        if self.include_username {
            let author = event.author.trim();
            let author = if author.is_empty() { UNKNOWN_AUTHOR } else { author };
            Utterance::new(format!("{} says: {}", author, body))
        } else {
            Utterance::new(body)
        }
    }
}

/// Replace every URL in `text` with the link placeholder.
pub fn replace_links(text: &str) -> Cow<'_, str> {
    LINK_PATTERN.replace_all(text, LINK_PLACEHOLDER)
}

/// Cut `text` to at most `max_chars` characters, never inside a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
