//! Conversation window construction.
//!
//! Rebuilds a bounded, role-labeled conversation window from the raw
//! messages of a Slack thread. Everything here is a pure function of its
//! inputs so the pipeline can be exercised without a live gateway: role
//! assignment depends only on authorship, sentinel replies are dropped
//! before the window is cut, and the assistant-cue decision for flattened
//! transcripts is its own function of the final turn's role.

use crate::channels::APOLOGY_TEXT;
use crate::providers::sanitize::FALLBACK_TEXT;
use regex::Regex;
use std::fmt::Write;
use std::sync::OnceLock;

/// Default cap on turns carried into a model prompt. Recency beats
/// completeness; older turns are dropped first.
pub const DEFAULT_HISTORY_LIMIT: usize = 16;

/// Who produced a turn. Derived from message authorship, never from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire-format role name for chat-message request bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Transcript label for flattened prompts ("User:" / "Assistant:").
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One message as read back from the thread store. Immutable once fetched;
/// ordering is the platform's chronological order within the thread.
#[derive(Debug, Clone)]
pub struct ThreadMessage {
    pub author: String,
    pub text: String,
    pub ts: String,
    pub is_bot: bool,
}

/// One role-labeled unit of conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// True for messages carrying one of the relay's own canned reply strings.
/// A prior failed reply must never occupy a window slot: a fallback or
/// apology in context teaches the model to apologize back.
fn is_reply_sentinel(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with(FALLBACK_TEXT) || trimmed.starts_with(APOLOGY_TEXT)
}

fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<@[^>]+>").expect("literal pattern compiles"))
}

/// Remove Slack mention tokens (`<@U…>`) and trim the remainder. The result
/// may be empty; an empty user turn is forwarded as-is.
pub fn strip_mentions(text: &str) -> String {
    mention_pattern().replace_all(text, "").trim().to_string()
}

/// Build the conversation window: drop sentinel replies, label the rest by
/// authorship, and keep the most recent `capacity` turns in order.
pub fn build_window(messages: &[ThreadMessage], capacity: usize) -> Vec<Turn> {
    let turns: Vec<Turn> = messages
        .iter()
        .filter(|msg| !is_reply_sentinel(&msg.text))
        .map(|msg| Turn {
            role: if msg.is_bot {
                Role::Assistant
            } else {
                Role::User
            },
            text: strip_mentions(&msg.text),
        })
        .collect();

    let skip = turns.len().saturating_sub(capacity);
    turns.into_iter().skip(skip).collect()
}

/// Whether a flattened transcript needs a trailing empty `Assistant:` cue.
/// Only a window ending in a user turn gets one; the model should continue
/// the conversation, not restate the question. A trailing assistant turn
/// gets no cue (a duplicate assistant label would fabricate a turn).
pub fn needs_assistant_cue(window: &[Turn]) -> bool {
    matches!(window.last(), Some(turn) if turn.role == Role::User)
}

/// Render the window as a role-prefixed transcript for single-string
/// prompts, one `Label: text` line per turn, cue per [`needs_assistant_cue`].
pub fn flatten_transcript(window: &[Turn]) -> String {
    let mut transcript = String::new();
    for turn in window {
        let _ = writeln!(transcript, "{}: {}", turn.role.label(), turn.text);
    }
    if needs_assistant_cue(window) {
        transcript.push_str("Assistant:");
    }
    transcript
}

/// Most recent user text in the window, for history-less completion bodies.
pub fn latest_user_text(window: &[Turn]) -> &str {
    window
        .iter()
        .rfind(|turn| turn.role == Role::User)
        .map_or("", |turn| turn.text.as_str())
}
