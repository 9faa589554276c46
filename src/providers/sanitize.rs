//! Reply sanitization.
//!
//! Model output is untrusted text: models fabricate the next user turn,
//! echo transcript role labels, and leak end-of-turn control tokens from
//! their chat templates. Everything user-facing passes through here. The
//! contract is total: any input string produces a string, and a response
//! envelope with no usable text produces [`FALLBACK_TEXT`] rather than an
//! error.

use super::profile::ModelProfile;
use serde_json::Value;

/// Posted when generation or extraction produced nothing usable. Also a
/// window sentinel: see `conversation::build_window`.
pub const FALLBACK_TEXT: &str = "Sorry, I could not generate a response.";

/// A fabricated next user turn starts here; everything from the marker on
/// is discarded.
const FABRICATED_TURN_MARKER: &str = "User:";

/// Role label models echo back from flattened transcripts.
const ASSISTANT_LABEL: &str = "Assistant:";

/// End-of-turn / template control tokens stripped wherever they appear.
const CONTROL_TOKENS: [&str; 6] = [
    "</s>",
    "<s>",
    "<|eot_id|>",
    "<|end_of_text|>",
    "[INST]",
    "[/INST]",
];

/// Clean one raw model reply: cut at a fabricated user turn, drop echoed
/// assistant labels and control tokens, trim. Idempotent for input without
/// the `User:` marker; never fails.
pub fn sanitize_reply(raw: &str) -> String {
    let cut = match raw.find(FABRICATED_TURN_MARKER) {
        Some(idx) => &raw[..idx],
        None => raw,
    };

    let mut text = cut.replace(ASSISTANT_LABEL, "");
    for token in CONTROL_TOKENS {
        if text.contains(token) {
            text = text.replace(token, "");
        }
    }
    text.trim().to_string()
}

/// Extract the generated text along the profile's field path and sanitize
/// it. A missing, empty, or sanitized-to-nothing reply becomes the fixed
/// fallback string.
pub fn extract_reply(profile: &ModelProfile, body: &Value) -> String {
    let cleaned = profile
        .extract_text(body)
        .map(sanitize_reply)
        .unwrap_or_default();

    if cleaned.is_empty() {
        FALLBACK_TEXT.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::profile::{CompletionParams, MessagesParams};

    #[test]
    fn cuts_at_fabricated_user_turn() {
        assert_eq!(sanitize_reply("Hello there\nUser: what about\n"), "Hello there");
    }

    #[test]
    fn strips_assistant_labels_and_control_tokens() {
        assert_eq!(sanitize_reply("Assistant: 4</s>"), "4");
        assert_eq!(sanitize_reply("fine<|eot_id|>"), "fine");
        assert_eq!(sanitize_reply("[INST]ok[/INST]"), "ok");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(sanitize_reply("  spaced out \n"), "spaced out");
    }

    #[test]
    fn is_idempotent_without_the_user_marker() {
        for raw in ["plain answer", "Assistant: echo</s>", "  padded  ", ""] {
            let once = sanitize_reply(raw);
            assert_eq!(sanitize_reply(&once), once);
        }
    }

    #[test]
    fn malformed_text_never_errors() {
        // Nothing here should panic, whatever the mix of markers.
        let _ = sanitize_reply("User:User:User:");
        let _ = sanitize_reply("</s></s>Assistant:");
        let _ = sanitize_reply("\u{0}\u{FFFD}User:");
    }

    #[test]
    fn missing_field_yields_fallback() {
        let profile = ModelProfile::Completion(CompletionParams::default());
        let reply = extract_reply(&profile, &serde_json::json!({"unrelated": true}));
        assert_eq!(reply, FALLBACK_TEXT);
    }

    #[test]
    fn empty_field_yields_fallback() {
        let profile = ModelProfile::Completion(CompletionParams::default());
        let reply = extract_reply(&profile, &serde_json::json!({"completion": "   "}));
        assert_eq!(reply, FALLBACK_TEXT);
    }

    #[test]
    fn reply_that_sanitizes_to_nothing_yields_fallback() {
        let profile = ModelProfile::Completion(CompletionParams::default());
        let reply = extract_reply(&profile, &serde_json::json!({"completion": "User: hm"}));
        assert_eq!(reply, FALLBACK_TEXT);
    }

    #[test]
    fn nested_messages_path_is_sanitized_too() {
        let profile = ModelProfile::Messages(MessagesParams::default());
        let body = serde_json::json!({
            "output": {"message": {"content": [{"text": "Assistant: sure\nUser: next?"}]}}
        });
        assert_eq!(extract_reply(&profile, &body), "sure");
    }
}
