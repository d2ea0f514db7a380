//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use crate::common::error::ConfigError;
use crate::config::types::{Config, TOKEN_PLACEHOLDER};

/// Validate a configuration and return detailed errors.
///
/// A missing bot token is reported on its own as `MissingField`; every
/// other problem is collected into a single `ValidationError`.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let token = config.discord.token.trim();
    if token.is_empty() || token == TOKEN_PLACEHOLDER {
        return Err(ConfigError::MissingField {
            field: "discord.token (or DISCORD_BOT_TOKEN)".to_string(),
        });
    }

    let mut errors = Vec::new();

    if config.discord.channel.trim().is_empty() {
        errors.push("discord.channel is required".to_string());
    }
    if config.discord.privileged_role.trim().is_empty() {
        errors.push("discord.privileged_role is required".to_string());
    }

    if config.rcon.host.is_empty() {
        errors.push("rcon.host is required".to_string());
    }
    if config.rcon.port == 0 {
        errors.push("rcon.port must be non-zero".to_string());
    }
    if config.rcon.timeout_secs == 0 {
        errors.push("rcon.timeout_secs must be non-zero".to_string());
    }

    if config.minecraft.log_file.is_empty() {
        errors.push("minecraft.log_file is required".to_string());
    }

    // The tag ends up inside an entity selector.
    let tag = &config.relay.avatar_tag;
    if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        errors.push(format!(
            "relay.avatar_tag '{}' must be non-empty and contain only letters, digits, '_' or '-'",
            tag
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_valid_config() -> Config {
        let mut config = Config::default();
        config.discord.token = "valid_token_here".to_string();
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&make_valid_config()).is_ok());
    }

    #[test]
    fn test_placeholder_token_is_missing_credential() {
        let config = Config::default();
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::MissingField { .. })));
    }

    #[test]
    fn test_empty_token_is_missing_credential() {
        let mut config = make_valid_config();
        config.discord.token = "  ".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_errors_are_collected() {
        let mut config = make_valid_config();
        config.discord.channel = String::new();
        config.rcon.port = 0;

        let message = validate_config(&config).unwrap_err().to_string();
        assert!(message.contains("discord.channel"));
        assert!(message.contains("rcon.port"));
    }

    #[test]
    fn test_selector_unsafe_tag_fails() {
        let mut config = make_valid_config();
        config.relay.avatar_tag = "a,b]".to_string();
        assert!(validate_config(&config)
            .unwrap_err()
            .to_string()
            .contains("avatar_tag"));
    }
}
