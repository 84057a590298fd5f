//! Configuration validation.
//!
//! Collects every problem so a broken config is reported in one go.

use crate::bridge::mapping::ChannelMapping;
use crate::common::error::ConfigError;
use crate::config::types::Config;

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.discord.token.is_empty() {
        errors.push("discord.token is required".to_string());
    }
    if config.discord.token == "YOUR_DISCORD_TOKEN_HERE" {
        errors.push("discord.token has not been configured (still using placeholder)".to_string());
    }
    if config.guild_id().is_none() {
        errors.push(format!(
            "discord.guild_id '{}' is not a valid snowflake",
            config.discord.guild_id
        ));
    }

    if config.irc.server.trim().is_empty() {
        errors.push("irc.server is required (missing server name)".to_string());
    } else if config.irc.host_port().is_none() {
        errors.push(format!(
            "irc.server '{}' is not a valid host[:port]",
            config.irc.server
        ));
    }
    if config.irc.listener_name.trim().is_empty() {
        errors.push("irc.listener_name is required".to_string());
    } else if config.irc.listener_name.contains(' ') {
        errors.push("irc.listener_name must not contain spaces".to_string());
    }

    if let Err(e) = ChannelMapping::build(&config.channel_mappings) {
        errors.push(format!("channel_mappings: {}", e));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}
