#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args
)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use threadrelay::channels::{self, ChatGateway, RelayContext, SlackChannel};
use threadrelay::providers::BedrockClient;
use threadrelay::Config;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Slack thread relay for AWS Bedrock models.
#[derive(Parser, Debug)]
#[command(name = "threadrelay")]
#[command(version)]
#[command(about = "Slack mentions and DMs in, sanitized Bedrock replies out.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to Slack and relay events to the model (default)
    Run,
    /// Check Slack and Bedrock configuration without relaying
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respects RUST_LOG, defaults to INFO.
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = Config::from_env()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Doctor => doctor(config).await,
    }
}

fn slack_from_config(config: &Config) -> SlackChannel {
    SlackChannel::new(
        config.slack_bot_token.clone().unwrap_or_default(),
        config.slack_app_token.clone().unwrap_or_default(),
    )
}

async fn run(config: Config) -> Result<()> {
    let slack = Arc::new(slack_from_config(&config));

    // First gateway call; a missing or bad bot token fails here.
    let bot_user_id = slack.bot_user_id().await?;
    info!(%bot_user_id, model = %config.model_id, profile = config.profile.name(), "relay starting");

    let generator = Arc::new(BedrockClient::new(&config.model_id, config.profile.clone()));

    let (tx, rx) = tokio::sync::mpsc::channel(32);
    let listener = {
        let slack = slack.clone();
        tokio::spawn(async move {
            if let Err(error) = slack.listen(tx).await {
                warn!(%error, "Slack listener stopped");
            }
        })
    };

    let ctx = Arc::new(RelayContext {
        gateway: slack,
        generator,
        bot_user_id,
        system_prompt: config.system_prompt,
        history_limit: config.history_limit,
    });
    channels::run(ctx, rx).await;

    listener.abort();
    Ok(())
}

async fn doctor(config: Config) -> Result<()> {
    let slack = slack_from_config(&config);
    match slack.bot_user_id().await {
        Ok(id) => println!("Slack bot token        ok (bot user {id})"),
        Err(error) => println!("Slack bot token        FAILED: {error}"),
    }
    println!(
        "Slack app token        {}",
        if config.slack_app_token.is_some() {
            "present"
        } else {
            "MISSING (Socket Mode cannot connect)"
        }
    );
    println!(
        "Slack signing secret   {}",
        if config.slack_signing_secret.is_some() {
            "present"
        } else {
            "missing"
        }
    );

    let bedrock = BedrockClient::new(&config.model_id, config.profile.clone());
    println!(
        "AWS credentials        {}",
        if bedrock.has_credentials() {
            "present"
        } else {
            "MISSING (set AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY)"
        }
    );
    println!(
        "Model                  {} (profile: {})",
        config.model_id,
        config.profile.name()
    );
    Ok(())
}
