//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `DISCORD_BOT_TOKEN` - Discord bot token
//! - `MC_DISCORD_CHANNEL` - Discord channel to relay through
//! - `MC_DISCORD_PRIV_ROLE` - Role allowed to run privileged commands
//! - `RCON_HOST` / `RCON_PORT` / `RCON_PASS` - Remote console connection
//! - `MC_LOGFILE` - Minecraft server log to follow

use std::env;

use tracing::warn;

use crate::config::types::Config;

pub const TOKEN_VAR: &str = "DISCORD_BOT_TOKEN";
pub const CHANNEL_VAR: &str = "MC_DISCORD_CHANNEL";
pub const ROLE_VAR: &str = "MC_DISCORD_PRIV_ROLE";
pub const RCON_HOST_VAR: &str = "RCON_HOST";
pub const RCON_PORT_VAR: &str = "RCON_PORT";
pub const RCON_PASS_VAR: &str = "RCON_PASS";
pub const LOGFILE_VAR: &str = "MC_LOGFILE";

/// Variable naming an alternative config file.
pub const CONFIG_VAR: &str = "MCRELAY_CONFIG";

/// Apply environment variable overrides to a config.
pub fn apply_env_overrides(config: Config) -> Config {
    apply_overrides(config, |name| env::var(name).ok())
}

/// Apply overrides from any variable source.
///
/// Empty values are ignored so that `FOO=` does not blank out a setting.
pub fn apply_overrides(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

    if let Some(token) = get(TOKEN_VAR) {
        config.discord.token = token;
    }
    if let Some(channel) = get(CHANNEL_VAR) {
        config.discord.channel = channel;
    }
    if let Some(role) = get(ROLE_VAR) {
        config.discord.privileged_role = role;
    }

    if let Some(host) = get(RCON_HOST_VAR) {
        config.rcon.host = host;
    }
    if let Some(port) = get(RCON_PORT_VAR) {
        match port.parse() {
            Ok(port) => config.rcon.port = port,
            Err(_) => warn!("Ignoring {}: '{}' is not a port number", RCON_PORT_VAR, port),
        }
    }
    if let Some(password) = get(RCON_PASS_VAR) {
        config.rcon.password = password;
    }

    if let Some(path) = get(LOGFILE_VAR) {
        config.minecraft.log_file = path;
    }

    config
}

/// Check if any override variables are set but empty.
///
/// Returns a list of variable names that are set but empty.
pub fn check_empty_env_vars() -> Vec<String> {
    [
        TOKEN_VAR,
        CHANNEL_VAR,
        ROLE_VAR,
        RCON_HOST_VAR,
        RCON_PORT_VAR,
        RCON_PASS_VAR,
        LOGFILE_VAR,
    ]
    .into_iter()
    .filter(|var| env::var(var).map(|v| v.is_empty()).unwrap_or(false))
    .map(String::from)
    .collect()
}

/// Get the config file path from environment or use default.
///
/// Checks `MCRELAY_CONFIG`, otherwise returns "mcrelay.conf".
pub fn get_config_path() -> String {
    env::var(CONFIG_VAR).unwrap_or_else(|_| "mcrelay.conf".to_string())
}
