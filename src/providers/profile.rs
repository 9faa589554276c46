//! Model-family request/response profiles.
//!
//! Bedrock hosts model families with three mutually incompatible invoke
//! schemas. Rather than one handler per family, each family is a variant of
//! [`ModelProfile`] describing how to build the request body and where the
//! generated text lives in the response envelope. Body construction is a
//! pure projection of the conversation window; the window is never mutated.

use crate::conversation::{flatten_transcript, latest_user_text, Turn};
use serde::Serialize;
use serde_json::Value;

/// Generation parameters for free-text completion bodies.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionParams {
    pub max_tokens_to_sample: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub stop_sequences: Vec<String>,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            max_tokens_to_sample: 500,
            temperature: 0.7,
            top_p: 0.9,
            top_k: 250,
            stop_sequences: vec!["User:".to_string()],
        }
    }
}

/// Generation parameters for chat-message-array bodies.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesParams {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

impl Default for MessagesParams {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            temperature: 0.7,
            top_p: 0.9,
            stop_sequences: Vec::new(),
        }
    }
}

/// Generation parameters for instruction-template bodies.
#[derive(Debug, Clone, Serialize)]
pub struct InstructParams {
    pub max_gen_len: u32,
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for InstructParams {
    fn default() -> Self {
        Self {
            max_gen_len: 500,
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

/// Raised at startup for a profile name the relay does not know. Selecting
/// a profile is configuration, so this never surfaces per-request.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown model profile '{0}' (expected completion, messages, or instruct)")]
pub struct ProfileParseError(String);

/// One model family's request/response schema.
#[derive(Debug, Clone)]
pub enum ModelProfile {
    /// Single `prompt` string carrying the latest user text only, flat
    /// generation parameters, reply under `completion`.
    Completion(CompletionParams),
    /// `system` block plus a `messages` array of role-labeled content
    /// blocks, reply under `output.message.content[0].text`.
    Messages(MessagesParams),
    /// Single templated `prompt` string (delimited system block plus the
    /// flattened transcript), reply under `generation`.
    Instruct(InstructParams),
}

// Request bodies, one shape per family.

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    #[serde(flatten)]
    params: &'a CompletionParams,
}

#[derive(Serialize)]
struct TextBlock<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct MessageEntry<'a> {
    role: &'static str,
    content: [TextBlock<'a>; 1],
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<[TextBlock<'a>; 1]>,
    messages: Vec<MessageEntry<'a>>,
    #[serde(rename = "inferenceConfig")]
    inference_config: &'a MessagesParams,
}

#[derive(Serialize)]
struct InstructRequest<'a> {
    prompt: String,
    #[serde(flatten)]
    params: &'a InstructParams,
}

impl ModelProfile {
    /// Resolve a configured profile name. Unknown names are a configuration
    /// error and must be reported before any event is handled.
    pub fn parse(name: &str) -> Result<Self, ProfileParseError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "completion" | "text" => Ok(Self::Completion(CompletionParams::default())),
            "messages" | "chat" | "converse" => Ok(Self::Messages(MessagesParams::default())),
            "instruct" | "instruction" | "template" => {
                Ok(Self::Instruct(InstructParams::default()))
            }
            other => Err(ProfileParseError(other.to_string())),
        }
    }

    /// Pick a default profile from the model id's vendor prefix.
    pub fn for_model(model_id: &str) -> Self {
        if model_id.starts_with("anthropic.") {
            Self::Completion(CompletionParams::default())
        } else if model_id.starts_with("meta.") {
            Self::Instruct(InstructParams::default())
        } else {
            Self::Messages(MessagesParams::default())
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Completion(_) => "completion",
            Self::Messages(_) => "messages",
            Self::Instruct(_) => "instruct",
        }
    }

    /// Project the window and system instruction into this family's request
    /// body.
    pub fn build_request_body(&self, system: &str, window: &[Turn]) -> Value {
        match self {
            Self::Completion(params) => serde_json::to_value(CompletionRequest {
                prompt: latest_user_text(window),
                params,
            }),
            Self::Messages(params) => {
                let system = (!system.is_empty()).then(|| [TextBlock { text: system }]);
                let messages = window
                    .iter()
                    .map(|turn| MessageEntry {
                        role: turn.role.as_str(),
                        content: [TextBlock { text: &turn.text }],
                    })
                    .collect();
                serde_json::to_value(MessagesRequest {
                    system,
                    messages,
                    inference_config: params,
                })
            }
            Self::Instruct(params) => {
                let transcript = flatten_transcript(window);
                let prompt = if system.is_empty() {
                    transcript
                } else {
                    format!("<s>[INST] <<SYS>>\n{system}\n<</SYS>> [/INST]\n{transcript}")
                };
                serde_json::to_value(InstructRequest { prompt, params })
            }
        }
        .expect("request bodies contain no non-serializable values")
    }

    /// Pull the generated text out of this family's response envelope.
    /// `None` means the envelope carried no usable text; the caller maps
    /// that to the fallback reply.
    pub fn extract_text<'a>(&self, body: &'a Value) -> Option<&'a str> {
        match self {
            Self::Completion(_) => body.get("completion")?.as_str(),
            Self::Instruct(_) => body.get("generation")?.as_str(),
            Self::Messages(_) => body
                .get("output")?
                .get("message")?
                .get("content")?
                .get(0)?
                .get("text")?
                .as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> Vec<Turn> {
        vec![
            Turn::user("earlier question"),
            Turn::assistant("earlier answer"),
            Turn::user("what's 2+2?"),
        ]
    }

    #[test]
    fn parse_accepts_known_names_and_aliases() {
        assert_eq!(ModelProfile::parse("completion").unwrap().name(), "completion");
        assert_eq!(ModelProfile::parse(" Chat ").unwrap().name(), "messages");
        assert_eq!(ModelProfile::parse("instruct").unwrap().name(), "instruct");
        assert_eq!(ModelProfile::parse("converse").unwrap().name(), "messages");
    }

    #[test]
    fn parse_rejects_unknown_name() {
        let err = ModelProfile::parse("grpc").unwrap_err();
        assert!(err.to_string().contains("grpc"));
    }

    #[test]
    fn default_profile_follows_model_vendor_prefix() {
        assert_eq!(ModelProfile::for_model("anthropic.claude-v2").name(), "completion");
        assert_eq!(ModelProfile::for_model("meta.llama3-8b-instruct-v1:0").name(), "instruct");
        assert_eq!(ModelProfile::for_model("amazon.nova-lite-v1:0").name(), "messages");
    }

    #[test]
    fn completion_body_carries_latest_user_text_only() {
        let profile = ModelProfile::Completion(CompletionParams::default());
        let body = profile.build_request_body("be brief", &window());
        assert_eq!(body["prompt"], "what's 2+2?");
        assert_eq!(body["max_tokens_to_sample"], 500);
        assert_eq!(body["stop_sequences"][0], "User:");
        assert!(body.get("messages").is_none());
        assert!(body.get("system").is_none());
    }

    #[test]
    fn messages_body_renders_one_entry_per_turn_in_order() {
        let profile = ModelProfile::Messages(MessagesParams::default());
        let body = profile.build_request_body("be brief", &window());
        assert_eq!(body["system"][0]["text"], "be brief");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["content"][0]["text"], "what's 2+2?");
        assert_eq!(body["inferenceConfig"]["maxTokens"], 500);
        assert_eq!(body["inferenceConfig"]["topP"], 0.9);
    }

    #[test]
    fn messages_body_omits_empty_system() {
        let profile = ModelProfile::Messages(MessagesParams::default());
        let body = profile.build_request_body("", &window());
        assert!(body.get("system").is_none());
    }

    #[test]
    fn instruct_body_wraps_system_and_appends_cue() {
        let profile = ModelProfile::Instruct(InstructParams::default());
        let body = profile.build_request_body("be brief", &window());
        let prompt = body["prompt"].as_str().unwrap();
        assert!(prompt.starts_with("<s>[INST] <<SYS>>\nbe brief\n<</SYS>> [/INST]"));
        assert!(prompt.contains("User: what's 2+2?"));
        assert!(prompt.ends_with("Assistant:"));
        assert_eq!(body["max_gen_len"], 500);
    }

    #[test]
    fn instruct_body_without_system_is_bare_transcript() {
        let profile = ModelProfile::Instruct(InstructParams::default());
        let body = profile.build_request_body("", &[Turn::assistant("done")]);
        assert_eq!(body["prompt"], "Assistant: done\n");
    }

    #[test]
    fn adapter_does_not_mutate_the_window() {
        let window = window();
        let before = window.clone();
        let profile = ModelProfile::Messages(MessagesParams::default());
        let _ = profile.build_request_body("sys", &window);
        assert_eq!(window, before);
    }

    #[test]
    fn extract_text_reads_the_profile_specific_path() {
        let completion = ModelProfile::Completion(CompletionParams::default());
        let instruct = ModelProfile::Instruct(InstructParams::default());
        let messages = ModelProfile::Messages(MessagesParams::default());

        let body = serde_json::json!({"completion": " 4 "});
        assert_eq!(completion.extract_text(&body), Some(" 4 "));

        let body = serde_json::json!({"generation": "4"});
        assert_eq!(instruct.extract_text(&body), Some("4"));

        let body = serde_json::json!({
            "output": {"message": {"role": "assistant", "content": [{"text": "4"}]}}
        });
        assert_eq!(messages.extract_text(&body), Some("4"));
    }

    #[test]
    fn extract_text_is_none_for_foreign_shapes() {
        let completion = ModelProfile::Completion(CompletionParams::default());
        assert_eq!(completion.extract_text(&serde_json::json!({})), None);
        assert_eq!(
            completion.extract_text(&serde_json::json!({"completion": 42})),
            None
        );
        let messages = ModelProfile::Messages(MessagesParams::default());
        assert_eq!(
            messages.extract_text(&serde_json::json!({"output": {"message": {"content": []}}})),
            None
        );
    }
}
