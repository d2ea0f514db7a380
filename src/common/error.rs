//! Error types for the application.

use thiserror::Error;

/// Top-level application error.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("RCON error: {0}")]
    Rcon(#[from] RconError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Discord error: {0}")]
    Discord(#[from] DiscordError),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

/// Remote console (RCON) errors.
#[derive(Debug, Error)]
pub enum RconError {
    #[error("Failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Authentication rejected by server (bad password?)")]
    AuthFailed,

    #[error("Invalid packet: {message}")]
    InvalidPacket { message: String },

    #[error("Command body too long: {len} bytes")]
    BodyTooLong { len: usize },

    #[error("No response within {secs}s")]
    Timeout { secs: u64 },

    #[error("Response too large: {len} bytes, discarded")]
    ResponseTooLarge { len: usize },

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised inside the relay core.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    Rcon(#[from] RconError),

    #[error("Failed to send to chat: {message}")]
    Send { message: String },

    #[error("Cannot open log file '{path}': {source}")]
    LogSource {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot watch log file '{path}': {source}")]
    Watch {
        path: String,
        #[source]
        source: notify::Error,
    },

    #[error("Log forwarding stopped")]
    TailerStopped,

    #[error("Invalid command table: {message}")]
    Registry { message: String },
}

/// Discord-related errors.
#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("Channel not found: {name}")]
    ChannelNotFound { name: String },

    #[error("Discord gateway closed")]
    GatewayClosed,

    #[error("Serenity error: {0}")]
    Serenity(#[from] serenity::Error),
}

impl From<DiscordError> for RelayError {
    fn from(error: DiscordError) -> Self {
        RelayError::Send {
            message: error.to_string(),
        }
    }
}

/// Result type alias for RCON operations.
pub type RconResult<T> = std::result::Result<T, RconError>;

/// Result type alias for relay core operations.
pub type RelayResult<T> = std::result::Result<T, RelayError>;

/// Result type alias for Discord operations.
pub type DiscordResult<T> = std::result::Result<T, DiscordError>;
