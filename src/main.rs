//! mcrelay - Discord-Minecraft relay
//!
//! Forwards interesting lines of the Minecraft server log into a Discord
//! channel, and runs chat messages from that channel on the server through
//! RCON.

mod common;
mod config;
mod discord;
mod lookup;
mod protocol;
mod relay;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tracing::{error, info, warn};

use common::error::{AppError, ConfigError, DiscordError};
use config::env::{get_config_path, TOKEN_VAR};
use config::{load_and_validate, Config};
use discord::DiscordBotBuilder;
use protocol::rcon::RconClient;
use relay::{build_registry, RelaySession, SessionSettings};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("mcrelay v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = match load_and_validate(&config_path) {
        Ok(config) => config,
        Err(ConfigError::MissingField { field }) => {
            error!("Missing {}", field);
            error!("Set {} or discord.token in {}.", TOKEN_VAR, config_path);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration loaded successfully");
    info!("  Channel: #{}", config.discord.channel);
    info!("  Privileged role: {}", config.discord.privileged_role);
    info!("  RCON: {}", config.rcon.address());
    info!("  Log file: {}", config.minecraft.log_file);

    if let Err(e) = run(config).await {
        error!("{}", e);
        // Give a moment for error logs to flush
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::process::exit(1);
    }

    info!("Exiting...");
    Ok(())
}

/// Connect everything and relay until a signal or a fatal error.
async fn run(config: Config) -> std::result::Result<(), AppError> {
    let settings = SessionSettings::from_config(&config);
    let address = config.rcon.address();
    let timeout = Duration::from_secs(config.rcon.timeout_secs);

    let (session, mut failures) = RelaySession::connect(
        settings,
        RconClient::connect(&address, &config.rcon.password, timeout),
    )
    .await?;
    let session = Arc::new(session);

    let public_ip = lookup::public_ip(&config.relay.public_ip_url).await;

    let registry = Arc::new(build_registry(
        session.console(),
        &config.discord.privileged_role,
        &public_ip,
        &config.relay.avatar_tag,
    )?);

    let bot = DiscordBotBuilder::new(config.discord.clone(), session.clone(), registry)
        .build()
        .await?;
    let shard_manager = bot.shard_manager();

    info!("Starting Discord bot...");
    let mut discord_task = tokio::spawn(bot.run());

    let outcome = tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            session.terminate();
            if let Some(manager) = shard_manager {
                let stop = manager.shutdown_all();
                if tokio::time::timeout(Duration::from_secs(5), stop).await.is_err() {
                    warn!("Discord shutdown timed out");
                }
            }
            Ok(())
        }
        result = &mut discord_task => {
            session.fail();
            match result {
                Ok(Ok(())) => Err(DiscordError::GatewayClosed.into()),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => {
                    error!("Discord task panicked: {}", e);
                    Err(DiscordError::GatewayClosed.into())
                }
            }
        }
        Some(e) = failures.recv() => {
            session.fail();
            Err(e.into())
        }
    };

    discord_task.abort();
    info!("Relay session {}", session.state());
    outcome
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
