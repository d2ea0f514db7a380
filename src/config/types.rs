//! Configuration type definitions.

use serde::Deserialize;

/// Placeholder the token defaults to when nothing was configured.
pub const TOKEN_PLACEHOLDER: &str = "none";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub rcon: RconConfig,
    #[serde(default)]
    pub minecraft: MinecraftConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Discord bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    #[serde(default = "default_token")]
    pub token: String,
    /// Name of the single channel the relay binds to.
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Role required for privileged commands.
    #[serde(default = "default_privileged_role")]
    pub privileged_role: String,
    /// Restrict channel lookup to one server.
    pub guild_id: Option<u64>,
    /// Gateway reconnect attempts before the session is considered lost.
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: usize,
}

/// Remote console connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RconConfig {
    #[serde(default = "default_rcon_host")]
    pub host: String,
    #[serde(default = "default_rcon_port")]
    pub port: u16,
    #[serde(default = "default_rcon_password")]
    pub password: String,
    /// Per-command response timeout.
    #[serde(default = "default_rcon_timeout")]
    pub timeout_secs: u64,
}

/// Minecraft server log settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MinecraftConfig {
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// Relay behaviour settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Service returning the host's public address as plain text.
    #[serde(default = "default_public_ip_url")]
    pub public_ip_url: String,
    /// Tag put on every avatar entity so a new session can clear them.
    #[serde(default = "default_avatar_tag")]
    pub avatar_tag: String,
}

fn default_token() -> String {
    TOKEN_PLACEHOLDER.to_string()
}

fn default_channel() -> String {
    "mcchat".to_string()
}

fn default_privileged_role() -> String {
    "mc cmds".to_string()
}

fn default_max_reconnects() -> usize {
    10
}

fn default_rcon_host() -> String {
    "localhost".to_string()
}

fn default_rcon_port() -> u16 {
    25575
}

fn default_rcon_password() -> String {
    "minecraft".to_string()
}

fn default_rcon_timeout() -> u64 {
    10
}

fn default_log_file() -> String {
    "./logs/latest.log".to_string()
}

fn default_public_ip_url() -> String {
    "https://api.ipify.org".to_string()
}

fn default_avatar_tag() -> String {
    "discord".to_string()
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: default_token(),
            channel: default_channel(),
            privileged_role: default_privileged_role(),
            guild_id: None,
            max_reconnects: default_max_reconnects(),
        }
    }
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: default_rcon_host(),
            port: default_rcon_port(),
            password: default_rcon_password(),
            timeout_secs: default_rcon_timeout(),
        }
    }
}

impl Default for MinecraftConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            public_ip_url: default_public_ip_url(),
            avatar_tag: default_avatar_tag(),
        }
    }
}

impl RconConfig {
    /// `host:port` string for connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
