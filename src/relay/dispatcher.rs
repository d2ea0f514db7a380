//! Routes inbound chat messages to commands.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::common::InboundMessage;
use crate::relay::registry::{CommandRegistry, Invocation};
use crate::relay::sink::ReplySink;

/// Split a message into its leading `<token>` and the trimmed remainder.
///
/// Without a leading token the whole message is the remainder.
pub fn parse_message(content: &str) -> (Option<&str>, &str) {
    if let Some(rest) = content.strip_prefix('<') {
        if let Some(end) = rest.find('>') {
            return (Some(&rest[..end]), rest[end + 1..].trim());
        }
    }
    (None, content)
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Own message or foreign channel.
    Ignored,
    Executed { token: String },
    UnknownCommand { token: String },
    Denied { token: String },
    /// Handler ran and returned an error, which was reported in chat.
    Failed { token: String },
}

pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    /// The channel replies go to; messages elsewhere are ignored.
    channel_id: u64,
    self_id: u64,
}

impl Dispatcher {
    pub fn new(registry: Arc<CommandRegistry>, channel_id: u64, self_id: u64) -> Self {
        Self {
            registry,
            channel_id,
            self_id,
        }
    }

    /// Handle one message, replying through `reply`.
    ///
    /// Never fails: every problem ends up as a chat reply and a log line.
    pub async fn dispatch(&self, message: &InboundMessage, reply: &dyn ReplySink) -> DispatchOutcome {
        if message.author.id == self.self_id {
            return DispatchOutcome::Ignored;
        }
        if message.channel_id != self.channel_id {
            debug!("Ignoring message in #{} ({})", message.channel_name, message.channel_id);
            return DispatchOutcome::Ignored;
        }

        let author = &message.author;
        let (token, remainder) = parse_message(&message.content);

        let command = match token {
            None => self.registry.default_command(),
            Some(token) => match self.registry.lookup(token) {
                Some(command) => command,
                None => {
                    info!(token, "{} asked for an unknown command", author.name);
                    self.reply(
                        reply,
                        &format!("I've looked around but i cant find a command called <{}>", token),
                    )
                    .await;
                    return DispatchOutcome::UnknownCommand {
                        token: token.to_string(),
                    };
                }
            },
        };

        let token = command.token.clone();
        if !author.is_allowed(&command.allowed_roles) {
            warn!(token = %token, "{} is not allowed to run {}", author.name, command.display_token());
            self.reply(
                reply,
                &format!("{} cant run the command: {}", author.name, command.display_token()),
            )
            .await;
            return DispatchOutcome::Denied { token };
        }

        debug!(token = %token, "{} runs {}", author.name, command.display_token());
        let invocation = Invocation {
            author,
            reply,
            registry: &self.registry,
        };

        match command.handler.handle(&invocation, remainder).await {
            Ok(()) => DispatchOutcome::Executed { token },
            Err(e) => {
                warn!(token = %token, "Command {} failed: {}", command.display_token(), e);
                self.reply(
                    reply,
                    &format!("Command {} failed: {}", command.display_token(), e),
                )
                .await;
                DispatchOutcome::Failed { token }
            }
        }
    }

    async fn reply(&self, reply: &dyn ReplySink, text: &str) {
        if let Err(e) = reply.send(text).await {
            warn!("Could not deliver reply '{}': {}", text, e);
        }
    }
}
