//! Immutable command table.
//!
//! Built once at startup and shared by reference with the dispatcher.
//! Tokens are stored without their angle brackets.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::common::error::{RelayError, RelayResult};
use crate::common::Author;
use crate::relay::sink::ReplySink;

/// Everything a handler gets to know about the invocation.
pub struct Invocation<'a> {
    pub author: &'a Author,
    pub reply: &'a dyn ReplySink,
    pub registry: &'a CommandRegistry,
}

/// A command implementation.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, invocation: &Invocation<'_>, args: &str) -> RelayResult<()>;
}

/// One registered command.
pub struct Command {
    pub token: String,
    pub allowed_roles: Vec<String>,
    pub help: String,
    pub handler: Arc<dyn CommandHandler>,
}

impl Command {
    /// Token as typed in chat, e.g. `<cmd>`.
    pub fn display_token(&self) -> String {
        format!("<{}>", self.token)
    }
}

/// Lookup table from token to command, in registration order.
pub struct CommandRegistry {
    commands: Vec<Command>,
    index: HashMap<String, usize>,
    default_index: usize,
}

impl CommandRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn lookup(&self, token: &str) -> Option<&Command> {
        self.index.get(token).map(|&i| &self.commands[i])
    }

    /// The command used for messages without a token.
    pub fn default_command(&self) -> &Command {
        &self.commands[self.default_index]
    }

    /// Registered tokens in registration order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|c| c.token.as_str())
    }
}

/// Collects commands before freezing them into a [`CommandRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    commands: Vec<Command>,
}

impl RegistryBuilder {
    pub fn command(
        mut self,
        token: &str,
        allowed_roles: &[&str],
        help: &str,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        self.commands.push(Command {
            token: token.to_string(),
            allowed_roles: allowed_roles.iter().map(|r| r.to_string()).collect(),
            help: help.to_string(),
            handler,
        });
        self
    }

    /// Freeze the table. Fails on duplicate tokens or an unknown default.
    pub fn build(self, default_token: &str) -> RelayResult<CommandRegistry> {
        let mut index = HashMap::with_capacity(self.commands.len());
        for (i, command) in self.commands.iter().enumerate() {
            if index.insert(command.token.clone(), i).is_some() {
                return Err(RelayError::Registry {
                    message: format!("duplicate command <{}>", command.token),
                });
            }
        }

        let default_index = *index.get(default_token).ok_or_else(|| RelayError::Registry {
            message: format!("default command <{}> is not registered", default_token),
        })?;

        Ok(CommandRegistry {
            commands: self.commands,
            index,
            default_index,
        })
    }
}
