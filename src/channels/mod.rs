//! Event dispatch and the relay pipeline.
//!
//! The Slack listener pushes [`ChannelEvent`]s onto an mpsc channel; the
//! dispatch loop spawns one task per event. Each task runs the full
//! pipeline (fetch thread history, build the window, invoke the model,
//! post the sanitized reply) and contains its own failures: whatever goes
//! wrong, the user sees [`APOLOGY_TEXT`] in the thread and the cause goes
//! to the logs. Nothing propagates across handler tasks or out of the
//! process.

pub mod slack;
pub mod traits;

pub use slack::SlackChannel;
pub use traits::{ChannelEvent, ChatGateway, Generator};

use crate::conversation::{self, ThreadMessage};
use crate::util::truncate_with_ellipsis;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Posted when the handler itself fails (history fetch or inference call).
/// Also a window sentinel: see `conversation::build_window`.
pub const APOLOGY_TEXT: &str = "Sorry, I encountered an error while processing your request.";

/// Everything a handler task needs, read-only after startup.
pub struct RelayContext {
    pub gateway: Arc<dyn ChatGateway>,
    pub generator: Arc<dyn Generator>,
    /// Resolved once at startup via the gateway identity lookup.
    pub bot_user_id: String,
    pub system_prompt: String,
    pub history_limit: usize,
}

/// Dispatch events until the listener hangs up or ctrl-c arrives.
pub async fn run(ctx: Arc<RelayContext>, mut events: mpsc::Receiver<ChannelEvent>) {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested; stopping dispatch");
                break;
            }
            maybe_event = events.recv() => {
                let Some(event) = maybe_event else {
                    tracing::info!("event stream closed; stopping dispatch");
                    break;
                };
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    handle_event(&ctx, &event).await;
                });
            }
        }
    }
}

/// Run the pipeline for one event; on failure, log and post the apology.
pub async fn handle_event(ctx: &RelayContext, event: &ChannelEvent) {
    if event.user == ctx.bot_user_id {
        return;
    }

    match relay(ctx, event).await {
        Ok(reply) => {
            tracing::debug!(
                channel = %event.channel,
                ts = %event.ts,
                reply = %truncate_with_ellipsis(&reply, 80),
                "reply posted"
            );
        }
        Err(error) => {
            tracing::warn!(
                channel = %event.channel,
                ts = %event.ts,
                %error,
                "relay failed; posting apology"
            );
            if let Err(post_error) = ctx
                .gateway
                .post_reply(&event.channel, APOLOGY_TEXT, &event.ts)
                .await
            {
                tracing::warn!(channel = %event.channel, %post_error, "apology delivery failed");
            }
        }
    }
}

/// The pipeline proper. The reply anchors to the triggering event's own
/// timestamp, not the thread root, so it nests under the message that
/// asked.
async fn relay(ctx: &RelayContext, event: &ChannelEvent) -> anyhow::Result<String> {
    let mut messages = ctx
        .gateway
        .fetch_thread_replies(&event.channel, event.thread_root(), &ctx.bot_user_id)
        .await?;

    // A fetch that comes back empty still has the triggering message.
    if messages.is_empty() {
        messages.push(ThreadMessage {
            author: event.user.clone(),
            text: event.text.clone(),
            ts: event.ts.clone(),
            is_bot: false,
        });
    }

    let window = conversation::build_window(&messages, ctx.history_limit);
    let reply = ctx.generator.generate(&ctx.system_prompt, &window).await?;
    ctx.gateway
        .post_reply(&event.channel, &reply, &event.ts)
        .await?;
    Ok(reply)
}
