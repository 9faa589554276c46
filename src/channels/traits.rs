use crate::conversation::{ThreadMessage, Turn};
use async_trait::async_trait;

/// One inbound event worth answering: a channel mention of the bot or a
/// direct message.
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    pub channel: String,
    pub user: String,
    pub text: String,
    /// Timestamp of the triggering message itself. Replies anchor here.
    pub ts: String,
    /// Root of the thread the message belongs to, when it is a reply.
    pub thread_ts: Option<String>,
}

impl ChannelEvent {
    /// Thread anchor for the history fetch: the explicit thread root when
    /// present, otherwise the message's own timestamp.
    pub fn thread_root(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}

/// The chat platform, seen from the relay: thread history in, replies out,
/// plus the bot's own identity.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// The bot's own user id. Resolved once at startup and cached by the
    /// caller for the process lifetime.
    async fn bot_user_id(&self) -> anyhow::Result<String>;

    /// Ordered messages of one thread. `bot_user_id` decides the `is_bot`
    /// flag on each message.
    async fn fetch_thread_replies(
        &self,
        channel: &str,
        thread_root: &str,
        bot_user_id: &str,
    ) -> anyhow::Result<Vec<ThreadMessage>>;

    /// Post `text` into `channel`, threaded under `thread_ts`.
    async fn post_reply(&self, channel: &str, text: &str, thread_ts: &str) -> anyhow::Result<()>;
}

/// Model inference, seen from the relay: a window and a system instruction
/// in, sanitized reply text out.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, system_prompt: &str, window: &[Turn]) -> anyhow::Result<String>;
}
