//! Discord event handling.
//!
//! Turns gateway events into relay actions: the guild that carries the
//! configured channel starts the session, and every message in it is
//! dispatched as a command.

use std::sync::Arc;

use serenity::model::channel::{ChannelType, GuildChannel, Message};
use serenity::model::gateway::Ready;
use serenity::model::guild::Guild;
use serenity::model::id::UserId;
use serenity::prelude::*;
use tracing::{debug, error, info, warn};

use crate::common::error::DiscordError;
use crate::common::{Author, InboundMessage, EVERYONE_ROLE};
use crate::config::DiscordConfig;
use crate::discord::sink::ChannelSink;
use crate::relay::{CommandRegistry, RelaySession};

pub struct RelayHandler {
    session: Arc<RelaySession>,
    registry: Arc<CommandRegistry>,
    config: DiscordConfig,
    relay_user: Option<UserId>,
}

impl RelayHandler {
    pub fn new(session: Arc<RelaySession>, registry: Arc<CommandRegistry>, config: DiscordConfig) -> Self {
        Self {
            session,
            registry,
            config,
            relay_user: None,
        }
    }

    pub fn handle_ready(&mut self, ready: &Ready) {
        info!("Connected to Discord as {}. Waiting for guild data...", ready.user.name);
        self.relay_user = Some(ready.user.id);
    }

    pub async fn handle_guild_create(&mut self, context: Context, guild: Guild) {
        if let Some(wanted) = self.config.guild_id {
            if guild.id.get() != wanted {
                debug!("Skipping guild '{}' ({})", guild.name, guild.id);
                return;
            }
        }

        info!("Received guild data for '{}' ({} channels)", guild.name, guild.channels.len());

        let channel = match find_channel(guild.channels.values(), &self.config.channel).ok_or_else(|| {
            DiscordError::ChannelNotFound {
                name: self.config.channel.clone(),
            }
        }) {
            Ok(channel) => channel,
            Err(e) => {
                warn!("{} in guild '{}', still waiting", e, guild.name);
                return;
            }
        };

        let relay_user = match self.relay_user {
            Some(id) => id,
            None => context.cache.current_user().id,
        };

        info!("Relaying through #{} ({})", channel.name, channel.id);
        let sink = Arc::new(ChannelSink::new(context.http.clone(), channel.id));

        match self
            .session
            .enter_running(self.registry.clone(), sink, channel.id.get(), relay_user.get())
            .await
        {
            Ok(true) => info!("Relay is running"),
            Ok(false) => {}
            Err(e) => error!("Could not start the relay: {}", e),
        }
    }

    /// Dispatch one message in its own task.
    pub fn handle_message(&self, context: Context, message: Message) {
        let relay = match self.session.running() {
            Some(relay) => relay,
            None => {
                debug!("Relay not running yet, dropping message {}", message.id);
                return;
            }
        };

        let inbound = match inbound_message(&context, &message) {
            Some(inbound) => inbound,
            None => return,
        };

        tokio::spawn(async move {
            let outcome = relay.dispatcher.dispatch(&inbound, relay.sink.as_ref()).await;
            debug!("Message {} from {}: {:?}", message.id, inbound.author.name, outcome);
        });
    }
}

/// First text channel with the given name, in sidebar order.
fn find_channel<'a>(
    channels: impl Iterator<Item = &'a GuildChannel>,
    name: &str,
) -> Option<&'a GuildChannel> {
    channels
        .filter(|channel| channel.kind == ChannelType::Text && channel.name == name)
        .min_by_key(|channel| (channel.position, channel.id))
}

/// Nickname, then global display name, then account name.
fn display_name(nick: Option<&str>, global_name: Option<&str>, name: &str) -> String {
    nick.or(global_name).unwrap_or(name).to_string()
}

/// Chat-agnostic view of a guild message. `None` outside guilds.
fn inbound_message(context: &Context, message: &Message) -> Option<InboundMessage> {
    let guild_id = message.guild_id?;

    // Cache guard must not be held across an await.
    let (channel_name, mut roles) = {
        let guild = context.cache.guild(guild_id)?;
        let channel_name = guild
            .channels
            .get(&message.channel_id)
            .map(|channel| channel.name.clone())
            .unwrap_or_default();
        let roles: Vec<String> = message
            .member
            .as_ref()
            .map(|member| {
                member
                    .roles
                    .iter()
                    .filter_map(|id| guild.roles.get(id).map(|role| role.name.clone()))
                    .collect()
            })
            .unwrap_or_default();
        (channel_name, roles)
    };

    if !roles.iter().any(|role| role == EVERYONE_ROLE) {
        roles.insert(0, EVERYONE_ROLE.to_string());
    }

    let nick = message.member.as_ref().and_then(|member| member.nick.as_deref());
    let author = Author {
        id: message.author.id.get(),
        name: message.author.name.clone(),
        display_name: display_name(nick, message.author.global_name.as_deref(), &message.author.name),
        roles,
    };

    Some(InboundMessage {
        channel_id: message.channel_id.get(),
        channel_name,
        author,
        content: message.content_safe(&context.cache),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_precedence() {
        assert_eq!(display_name(Some("Builder"), Some("Steve S."), "steve"), "Builder");
        assert_eq!(display_name(None, Some("Steve S."), "steve"), "Steve S.");
        assert_eq!(display_name(None, None, "steve"), "steve");
    }
}
