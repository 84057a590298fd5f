//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `DIB_DISCORD_TOKEN` - Discord bot token
//! - `DIB_GUILD_ID` - Discord guild ID
//! - `DIB_IRC_SERVER` - IRC server address (`host[:port]`)
//! - `DIB_WEBIRC_PASSWORD` - WebIRC password

use std::env;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "DIB";

/// Apply environment variable overrides to a config.
///
/// Lets secrets stay out of the config file.
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(token) = env::var(format!("{}_DISCORD_TOKEN", ENV_PREFIX)) {
        config.discord.token = token;
    }
    if let Ok(guild_id) = env::var(format!("{}_GUILD_ID", ENV_PREFIX)) {
        config.discord.guild_id = guild_id;
    }
    if let Ok(server) = env::var(format!("{}_IRC_SERVER", ENV_PREFIX)) {
        config.irc.server = server;
    }
    if let Ok(password) = env::var(format!("{}_WEBIRC_PASSWORD", ENV_PREFIX)) {
        config.irc.webirc_password = password;
    }

    config
}

/// Get the config file path from environment or use default.
///
/// Checks `DIB_CONFIG`, otherwise returns "dib.conf".
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "dib.conf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::make_test_config;

    #[test]
    fn test_env_prefix() {
        assert_eq!(ENV_PREFIX, "DIB");
    }

    #[test]
    fn test_get_config_path_default() {
        env::remove_var("DIB_CONFIG");
        assert_eq!(get_config_path(), "dib.conf");
    }

    #[test]
    fn test_apply_env_overrides_no_vars() {
        env::remove_var("DIB_DISCORD_TOKEN");
        env::remove_var("DIB_GUILD_ID");

        let result = apply_env_overrides(make_test_config());

        assert_eq!(result.discord.token, "original_token");
        assert_eq!(result.discord.guild_id, "315278744572919808");
    }

    #[test]
    fn test_apply_env_overrides_irc() {
        env::set_var("DIB_IRC_SERVER", "irc.override.net:6667");
        env::set_var("DIB_WEBIRC_PASSWORD", "from-env");

        let result = apply_env_overrides(make_test_config());

        env::remove_var("DIB_IRC_SERVER");
        env::remove_var("DIB_WEBIRC_PASSWORD");

        assert_eq!(result.irc.server, "irc.override.net:6667");
        assert_eq!(result.irc.webirc_password, "from-env");
    }
}
