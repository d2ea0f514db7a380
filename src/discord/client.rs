//! Discord bot client.
//!
//! Serenity callbacks only forward events into a queue; a single loop
//! processes them in order, so the relay handler never runs concurrently
//! with itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::BackoffBuilder;
use serenity::async_trait;
use serenity::gateway::ShardManager;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::guild::Guild;
use serenity::prelude::*;
use serenity::Client;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::common::error::{DiscordError, DiscordResult};
use crate::config::DiscordConfig;
use crate::discord::handler::RelayHandler;
use crate::relay::{CommandRegistry, RelaySession};

#[derive(Debug, Clone)]
pub enum DiscordBotEvent {
    Ready(Ready),
    GuildCreate { context: Context, guild: Guild },
    Message { context: Context, message: Message },
    Disconnected,
}

struct DiscordBotEvents {
    discord_events_tx: mpsc::UnboundedSender<DiscordBotEvent>,
    /// Set on every Ready; lets the reconnect loop reset its backoff.
    connected: Arc<AtomicBool>,
}

impl DiscordBotEvents {
    fn forward(&self, event: DiscordBotEvent) {
        if let Err(error) = self.discord_events_tx.send(event) {
            warn!("Failed to process discord event: {}", error);
        }
    }
}

#[async_trait]
impl EventHandler for DiscordBotEvents {
    async fn ready(&self, _context: Context, ready: Ready) {
        self.connected.store(true, Ordering::SeqCst);
        self.forward(DiscordBotEvent::Ready(ready));
    }

    async fn guild_create(&self, context: Context, guild: Guild, _is_new: Option<bool>) {
        self.forward(DiscordBotEvent::GuildCreate { context, guild });
    }

    async fn message(&self, context: Context, message: Message) {
        self.forward(DiscordBotEvent::Message { context, message });
    }
}

pub struct DiscordBotBuilder {
    config: DiscordConfig,
    session: Arc<RelaySession>,
    registry: Arc<CommandRegistry>,
}

impl DiscordBotBuilder {
    pub fn new(config: DiscordConfig, session: Arc<RelaySession>, registry: Arc<CommandRegistry>) -> Self {
        Self {
            config,
            session,
            registry,
        }
    }

    pub async fn build(self) -> DiscordResult<DiscordBot> {
        let (discord_events_tx, discord_events_rx) = mpsc::unbounded_channel::<DiscordBotEvent>();
        let connected = Arc::new(AtomicBool::new(false));

        let client = build_client(&self.config.token, discord_events_tx.clone(), connected.clone()).await?;
        let handler = RelayHandler::new(self.session, self.registry, self.config.clone());

        Ok(DiscordBot {
            client: Some(client),
            token: self.config.token,
            max_reconnects: self.config.max_reconnects,
            connected,
            handler,
            discord_events_rx,
            discord_events_tx,
        })
    }
}

async fn build_client(
    token: &str,
    discord_events_tx: mpsc::UnboundedSender<DiscordBotEvent>,
    connected: Arc<AtomicBool>,
) -> DiscordResult<Client> {
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;

    let events = DiscordBotEvents {
        discord_events_tx,
        connected,
    };
    let client = Client::builder(token, intents).event_handler(events).await?;
    Ok(client)
}

/// 5s initial, 5min max, jitter, at most `max_times` retries in a row.
fn discord_backoff(max_times: usize) -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(5))
        .with_max_delay(Duration::from_secs(300))
        .with_factor(1.5)
        .with_jitter()
        .with_max_times(max_times)
        .build()
}

pub struct DiscordBot {
    client: Option<Client>,
    token: String,
    max_reconnects: usize,
    connected: Arc<AtomicBool>,
    handler: RelayHandler,
    discord_events_rx: mpsc::UnboundedReceiver<DiscordBotEvent>,
    discord_events_tx: mpsc::UnboundedSender<DiscordBotEvent>,
}

impl DiscordBot {
    /// Handle for stopping the gateway from outside `run`.
    pub fn shard_manager(&self) -> Option<Arc<ShardManager>> {
        self.client.as_ref().map(|client| client.shard_manager.clone())
    }

    /// Run until the gateway is stopped or lost for good.
    pub async fn run(mut self) -> DiscordResult<()> {
        let DiscordBot {
            client,
            token,
            max_reconnects,
            connected,
            handler,
            discord_events_rx,
            discord_events_tx,
        } = &mut self;

        let result = tokio::select! {
            result = Self::run_connection(client, token, discord_events_tx, connected, *max_reconnects) => result,
            _ = Self::process_events(discord_events_rx, handler) => Ok(()),
        };
        info!("Discord task ended");
        result
    }

    async fn run_connection(
        client: &mut Option<Client>,
        token: &str,
        discord_events_tx: &mpsc::UnboundedSender<DiscordBotEvent>,
        connected: &Arc<AtomicBool>,
        max_reconnects: usize,
    ) -> DiscordResult<()> {
        let mut backoff = discord_backoff(max_reconnects);

        loop {
            info!("Connecting to Discord...");

            let mut current = match client.take() {
                Some(current) => current,
                None => match build_client(token, discord_events_tx.clone(), connected.clone()).await {
                    Ok(current) => current,
                    Err(e) => {
                        error!("Failed to rebuild Discord client: {}", e);
                        let delay = backoff.next().ok_or(e)?;
                        warn!("Retrying in {:.1}s...", delay.as_secs_f64());
                        sleep(delay).await;
                        continue;
                    }
                },
            };

            let result = current.start().await;
            if connected.swap(false, Ordering::SeqCst) {
                backoff = discord_backoff(max_reconnects);
            }
            if let Err(error) = discord_events_tx.send(DiscordBotEvent::Disconnected) {
                warn!("Failed to process discord event: {}", error);
            }

            match result {
                Ok(()) => {
                    info!("Discord client disconnected normally");
                    return Ok(());
                }
                Err(e) => {
                    error!("Discord client error: {}", e);
                    let delay = match backoff.next() {
                        Some(delay) => delay,
                        None => {
                            error!("Giving up on Discord after {} reconnect attempts", max_reconnects);
                            return Err(DiscordError::Serenity(e));
                        }
                    };
                    warn!("Discord disconnected. Reconnecting in {:.1}s...", delay.as_secs_f64());
                    sleep(delay).await;
                }
            }
        }
    }

    async fn process_events(
        discord_events_rx: &mut mpsc::UnboundedReceiver<DiscordBotEvent>,
        handler: &mut RelayHandler,
    ) {
        let mut ready = false;

        while let Some(event) = discord_events_rx.recv().await {
            match event {
                DiscordBotEvent::Ready(data) => {
                    handler.handle_ready(&data);
                    ready = true;
                }
                DiscordBotEvent::GuildCreate { context, guild } => {
                    if !ready {
                        warn!("Received guild data for '{}' before Ready", guild.name);
                    }
                    handler.handle_guild_create(context, guild).await;
                }
                DiscordBotEvent::Message { context, message } => {
                    handler.handle_message(context, message);
                }
                DiscordBotEvent::Disconnected => {
                    ready = false;
                }
            }
        }

        debug!("Discord events channel closed.");
    }
}
