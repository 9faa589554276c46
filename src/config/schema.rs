//! Environment configuration.
//!
//! Everything is read once at process start. Missing credentials are a
//! warning, not a startup failure: the process comes up and the problem
//! surfaces as an authentication error on the first gateway call. The one
//! exception is an explicitly configured but unknown model profile, which
//! is a configuration error and refuses to start.

use crate::providers::ModelProfile;
use std::time::Duration;

const DEFAULT_MODEL_ID: &str = "anthropic.claude-v2";

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant replying inside a Slack thread. \
     Answer concisely in plain text without Markdown headings.";

/// Read a required environment variable, trimmed and non-empty.
pub fn env_required(name: &str) -> anyhow::Result<String> {
    env_optional(name).ok_or_else(|| anyhow::anyhow!("environment variable {name} is required"))
}

/// Read an optional environment variable, trimmed; empty counts as unset.
pub fn env_optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Build an HTTP client with explicit timeouts. Falls back to client
/// defaults if the builder fails.
pub fn build_http_client(timeout_secs: u64, connect_timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .build()
        .unwrap_or_else(|error| {
            tracing::warn!(%error, "failed to build HTTP client with timeouts");
            reqwest::Client::new()
        })
}

fn resolve_history_limit(raw: Option<String>) -> usize {
    match raw {
        None => crate::conversation::DEFAULT_HISTORY_LIMIT,
        Some(value) => match value.parse::<usize>() {
            Ok(limit) if limit > 0 => limit,
            _ => {
                tracing::warn!(
                    %value,
                    "HISTORY_LIMIT is not a positive integer; using the default"
                );
                crate::conversation::DEFAULT_HISTORY_LIMIT
            }
        },
    }
}

/// Process configuration, loaded once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Slack bot OAuth token (xoxb-...).
    pub slack_bot_token: Option<String>,
    /// Slack request-signing secret. Unused over Socket Mode but part of
    /// the app's credential set; `doctor` reports on it.
    pub slack_signing_secret: Option<String>,
    /// Slack app-level token for Socket Mode (xapp-...).
    pub slack_app_token: Option<String>,
    /// Bedrock model id, e.g. `anthropic.claude-v2`.
    pub model_id: String,
    /// Request/response schema for the configured model family.
    pub profile: ModelProfile,
    pub system_prompt: String,
    /// Cap on conversation turns carried into a prompt.
    pub history_limit: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let slack_bot_token = env_optional("SLACK_BOT_TOKEN");
        let slack_signing_secret = env_optional("SLACK_SIGNING_SECRET");
        let slack_app_token = env_optional("SLACK_APP_TOKEN");

        for (name, value) in [
            ("SLACK_BOT_TOKEN", &slack_bot_token),
            ("SLACK_SIGNING_SECRET", &slack_signing_secret),
            ("SLACK_APP_TOKEN", &slack_app_token),
        ] {
            if value.is_none() {
                tracing::warn!("{name} not set; Slack calls will fail until it is");
            }
        }

        if env_optional("AWS_ACCESS_KEY_ID").is_none()
            || env_optional("AWS_SECRET_ACCESS_KEY").is_none()
        {
            tracing::warn!(
                "AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY not set; model calls will fail"
            );
        }

        let model_id =
            env_optional("BEDROCK_MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());

        let profile = match env_optional("MODEL_PROFILE") {
            Some(name) => ModelProfile::parse(&name)?,
            None => ModelProfile::for_model(&model_id),
        };

        let system_prompt =
            env_optional("SYSTEM_PROMPT").unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let history_limit = resolve_history_limit(env_optional("HISTORY_LIMIT"));

        Ok(Self {
            slack_bot_token,
            slack_signing_secret,
            slack_app_token,
            model_id,
            profile,
            system_prompt,
            history_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_limit_defaults_and_rejects_garbage() {
        assert_eq!(
            resolve_history_limit(None),
            crate::conversation::DEFAULT_HISTORY_LIMIT
        );
        assert_eq!(resolve_history_limit(Some("8".into())), 8);
        assert_eq!(
            resolve_history_limit(Some("0".into())),
            crate::conversation::DEFAULT_HISTORY_LIMIT
        );
        assert_eq!(
            resolve_history_limit(Some("many".into())),
            crate::conversation::DEFAULT_HISTORY_LIMIT
        );
    }

    #[test]
    fn http_client_builder_does_not_panic() {
        let _ = build_http_client(30, 10);
    }
}
