//! Slack gateway: Web API for history and replies, Socket Mode for events.
//!
//! Slack reports most app-level failures as HTTP 200 with
//! `{"ok": false, "error": "..."}`, so every Web API call checks the `ok`
//! field in addition to the HTTP status.

use super::traits::{ChannelEvent, ChatGateway};
use crate::config;
use crate::conversation::ThreadMessage;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

const REPLIES_PAGE_LIMIT: &str = "200";
/// Pause between Socket Mode reconnect attempts.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

pub struct SlackChannel {
    bot_token: String,
    app_token: String,
    http: reqwest::Client,
}

impl SlackChannel {
    pub fn new(bot_token: String, app_token: String) -> Self {
        Self {
            bot_token,
            app_token,
            http: config::build_http_client(30, 10),
        }
    }

    /// Call one Slack Web API method and return the parsed payload after
    /// checking both the HTTP status and the `ok` field.
    async fn web_api(&self, request: reqwest::RequestBuilder, method: &str) -> anyhow::Result<Value> {
        let response = request.bearer_auth(&self.bot_token).send().await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));

        if !status.is_success() {
            anyhow::bail!("Slack {method} failed ({status}): {body}");
        }

        let data: Value = serde_json::from_str(&body).unwrap_or_default();
        if data.get("ok") == Some(&Value::Bool(false)) {
            let err = data
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown");
            anyhow::bail!("Slack {method} failed: {err}");
        }

        Ok(data)
    }

    /// Open a Socket Mode connection and return the WebSocket URL.
    /// `apps.connections.open` authenticates with the app-level token, not
    /// the bot token.
    async fn open_socket_url(&self) -> anyhow::Result<String> {
        let response = self
            .http
            .post("https://slack.com/api/apps.connections.open")
            .bearer_auth(&self.app_token)
            .send()
            .await?;

        let data: Value = response.json().await?;
        if data.get("ok") != Some(&Value::Bool(true)) {
            let err = data
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown");
            anyhow::bail!("Slack apps.connections.open failed: {err}");
        }

        data.get("url")
            .and_then(|u| u.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Slack apps.connections.open returned no url"))
    }

    fn message_from_value(msg: &Value, bot_user_id: &str) -> Option<ThreadMessage> {
        let text = msg.get("text").and_then(|t| t.as_str())?;
        let ts = msg.get("ts").and_then(|t| t.as_str())?;
        let author = msg.get("user").and_then(|u| u.as_str()).unwrap_or("");
        let is_bot = msg.get("bot_id").is_some() || (!author.is_empty() && author == bot_user_id);

        Some(ThreadMessage {
            author: author.to_string(),
            text: text.to_string(),
            ts: ts.to_string(),
            is_bot,
        })
    }

    /// Map one Socket Mode event payload onto a [`ChannelEvent`]. Only
    /// `app_mention` events and direct (`im`) messages qualify; bot
    /// messages, subtypes (edits, joins), and everything else are ignored.
    fn parse_event(event: &Value) -> Option<ChannelEvent> {
        let event_type = event.get("type").and_then(|t| t.as_str())?;

        let is_direct_message = event_type == "message"
            && event.get("channel_type").and_then(|c| c.as_str()) == Some("im")
            && event.get("subtype").is_none()
            && event.get("bot_id").is_none();

        if event_type != "app_mention" && !is_direct_message {
            return None;
        }

        Some(ChannelEvent {
            channel: event.get("channel")?.as_str()?.to_string(),
            user: event.get("user")?.as_str()?.to_string(),
            text: event
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or("")
                .to_string(),
            ts: event.get("ts")?.as_str()?.to_string(),
            thread_ts: event
                .get("thread_ts")
                .and_then(|t| t.as_str())
                .map(str::to_string),
        })
    }

    /// Run one Socket Mode session: connect, ack every envelope, forward
    /// qualifying events. Returns `Ok` only when the receiver side is gone;
    /// any transport error bubbles up for the reconnect loop.
    async fn run_socket(&self, tx: &tokio::sync::mpsc::Sender<ChannelEvent>) -> anyhow::Result<()> {
        let url = self.open_socket_url().await?;
        let (stream, _) = tokio_tungstenite::connect_async(&url).await?;
        let (mut write, mut read) = stream.split();

        tracing::info!("Slack Socket Mode connected; relay is running");

        while let Some(frame) = read.next().await {
            let text = match frame? {
                Message::Text(text) => text,
                Message::Ping(payload) => {
                    write.send(Message::Pong(payload)).await?;
                    continue;
                }
                Message::Close(_) => anyhow::bail!("Slack closed the Socket Mode connection"),
                _ => continue,
            };

            let envelope: Value = match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(error) => {
                    tracing::warn!(%error, "Slack sent an unparseable envelope");
                    continue;
                }
            };

            match envelope.get("type").and_then(|t| t.as_str()) {
                Some("hello") => {
                    tracing::debug!("Slack Socket Mode session established");
                }
                Some("disconnect") => {
                    let reason = envelope
                        .get("reason")
                        .and_then(|r| r.as_str())
                        .unwrap_or("unspecified");
                    anyhow::bail!("Slack requested disconnect: {reason}");
                }
                Some("events_api") => {
                    // Ack first; Slack redelivers unacked envelopes.
                    if let Some(envelope_id) = envelope.get("envelope_id").and_then(|i| i.as_str())
                    {
                        let ack = serde_json::json!({ "envelope_id": envelope_id });
                        write.send(Message::Text(ack.to_string().into())).await?;
                    }

                    let Some(event) = envelope
                        .get("payload")
                        .and_then(|p| p.get("event"))
                        .and_then(Self::parse_event)
                    else {
                        continue;
                    };

                    if tx.send(event).await.is_err() {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }

        anyhow::bail!("Slack Socket Mode stream ended")
    }

    /// Listen for events until the receiver is dropped, reconnecting with a
    /// short pause whenever a session dies.
    pub async fn listen(&self, tx: tokio::sync::mpsc::Sender<ChannelEvent>) -> anyhow::Result<()> {
        loop {
            match self.run_socket(&tx).await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    tracing::warn!(%error, "Slack Socket Mode session ended; reconnecting");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    }
}

#[async_trait]
impl ChatGateway for SlackChannel {
    async fn bot_user_id(&self) -> anyhow::Result<String> {
        let data = self
            .web_api(self.http.get("https://slack.com/api/auth.test"), "auth.test")
            .await?;
        data.get("user_id")
            .and_then(|u| u.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Slack auth.test returned no user_id"))
    }

    async fn fetch_thread_replies(
        &self,
        channel: &str,
        thread_root: &str,
        bot_user_id: &str,
    ) -> anyhow::Result<Vec<ThreadMessage>> {
        let request = self
            .http
            .get("https://slack.com/api/conversations.replies")
            .query(&[
                ("channel", channel),
                ("ts", thread_root),
                ("limit", REPLIES_PAGE_LIMIT),
            ]);
        let data = self.web_api(request, "conversations.replies").await?;

        let messages = data
            .get("messages")
            .and_then(|m| m.as_array())
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|msg| Self::message_from_value(msg, bot_user_id))
                    .collect()
            })
            .unwrap_or_default();

        Ok(messages)
    }

    async fn post_reply(&self, channel: &str, text: &str, thread_ts: &str) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "channel": channel,
            "text": text,
            "thread_ts": thread_ts,
        });
        self.web_api(
            self.http
                .post("https://slack.com/api/chat.postMessage")
                .json(&body),
            "chat.postMessage",
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_mention_event_is_accepted() {
        let event = serde_json::json!({
            "type": "app_mention",
            "channel": "C123",
            "user": "U100",
            "text": "<@BOT123> what's 2+2?",
            "ts": "1700000000.000100"
        });
        let parsed = SlackChannel::parse_event(&event).unwrap();
        assert_eq!(parsed.channel, "C123");
        assert_eq!(parsed.user, "U100");
        assert_eq!(parsed.ts, "1700000000.000100");
        assert_eq!(parsed.thread_ts, None);
    }

    #[test]
    fn threaded_mention_keeps_thread_root() {
        let event = serde_json::json!({
            "type": "app_mention",
            "channel": "C123",
            "user": "U100",
            "text": "<@BOT123> and now?",
            "ts": "1700000000.000300",
            "thread_ts": "1700000000.000100"
        });
        let parsed = SlackChannel::parse_event(&event).unwrap();
        assert_eq!(parsed.thread_root(), "1700000000.000100");
        assert_eq!(parsed.ts, "1700000000.000300");
    }

    #[test]
    fn direct_message_is_accepted() {
        let event = serde_json::json!({
            "type": "message",
            "channel_type": "im",
            "channel": "D123",
            "user": "U100",
            "text": "hello",
            "ts": "1700000000.000200"
        });
        assert!(SlackChannel::parse_event(&event).is_some());
    }

    #[test]
    fn channel_message_without_mention_is_ignored() {
        let event = serde_json::json!({
            "type": "message",
            "channel_type": "channel",
            "channel": "C123",
            "user": "U100",
            "text": "just chatting",
            "ts": "1700000000.000200"
        });
        assert!(SlackChannel::parse_event(&event).is_none());
    }

    #[test]
    fn bot_authored_dm_is_ignored() {
        let event = serde_json::json!({
            "type": "message",
            "channel_type": "im",
            "channel": "D123",
            "user": "UBOT",
            "bot_id": "B900",
            "text": "my own reply",
            "ts": "1700000000.000200"
        });
        assert!(SlackChannel::parse_event(&event).is_none());
    }

    #[test]
    fn message_subtypes_are_ignored() {
        let event = serde_json::json!({
            "type": "message",
            "channel_type": "im",
            "subtype": "message_changed",
            "channel": "D123",
            "user": "U100",
            "text": "edited",
            "ts": "1700000000.000200"
        });
        assert!(SlackChannel::parse_event(&event).is_none());
    }

    #[test]
    fn unrelated_event_types_are_ignored() {
        let event = serde_json::json!({"type": "reaction_added", "user": "U100"});
        assert!(SlackChannel::parse_event(&event).is_none());
    }

    #[test]
    fn thread_message_flags_bot_by_bot_id_or_author() {
        let by_bot_id = serde_json::json!({
            "text": "reply", "ts": "1.0", "bot_id": "B900"
        });
        let msg = SlackChannel::message_from_value(&by_bot_id, "UBOT").unwrap();
        assert!(msg.is_bot);

        let by_author = serde_json::json!({
            "text": "reply", "ts": "1.1", "user": "UBOT"
        });
        let msg = SlackChannel::message_from_value(&by_author, "UBOT").unwrap();
        assert!(msg.is_bot);

        let by_human = serde_json::json!({
            "text": "question", "ts": "1.2", "user": "U100"
        });
        let msg = SlackChannel::message_from_value(&by_human, "UBOT").unwrap();
        assert!(!msg.is_bot);
    }

    #[test]
    fn thread_message_without_ts_or_text_is_dropped() {
        let no_text = serde_json::json!({"ts": "1.0", "user": "U100"});
        assert!(SlackChannel::message_from_value(&no_text, "UBOT").is_none());
        let no_ts = serde_json::json!({"text": "hi", "user": "U100"});
        assert!(SlackChannel::message_from_value(&no_ts, "UBOT").is_none());
    }
}
