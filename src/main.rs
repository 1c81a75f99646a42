mod config;
mod expand;
mod platform;
mod secret;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::platform::discord::Bot;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,expandbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    // Config file is optional; the token can come from the environment alone
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => Config::from_env().context("Failed to load config from environment")?,
    };

    info!("Configuration loaded successfully");
    info!("  Token: {}", config.discord.token);
    info!("  Ignore bots: {}", config.discord.ignore_bots);
    info!("  Fetch timeout: {:?}", config.expand.fetch_timeout());

    let mut bot = Bot::new(config);
    bot.start().await.context("failed to start the bot")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for the shutdown signal")?;
    info!("received signal to stop the bot, shutting down...");

    bot.stop().await.context("failed to stop the bot")?;
    Ok(())
}
