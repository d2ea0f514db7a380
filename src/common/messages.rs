//! Chat-agnostic message types shared between the Discord adapter and the relay core.

/// Role name that every member of a Discord server implicitly holds.
pub const EVERYONE_ROLE: &str = "@everyone";

/// The identity that sent an inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    /// Stable external id (Discord user snowflake).
    pub id: u64,
    /// Account name, used when naming the invoker in replies.
    pub name: String,
    /// Name shown in chat (server nickname when set).
    pub display_name: String,
    /// Role names held by the author, `@everyone` included.
    pub roles: Vec<String>,
}

impl Author {
    /// Check whether the author holds at least one of the given roles.
    ///
    /// `@everyone` in `allowed` admits anybody.
    pub fn is_allowed(&self, allowed: &[String]) -> bool {
        allowed.iter().any(|role| role == EVERYONE_ROLE)
            || self.roles.iter().any(|role| allowed.contains(role))
    }
}

/// A message received from the chat service.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Id of the channel the message was posted in.
    pub channel_id: u64,
    /// Its name, for logging. Names are not unique within a guild.
    pub channel_name: String,
    pub author: Author,
    /// Message text with mentions resolved to readable names.
    pub content: String,
}
