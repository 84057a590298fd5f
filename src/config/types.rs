//! Configuration type definitions.

use std::collections::HashMap;

use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub discord: DiscordConfig,
    pub irc: IrcConfig,
    /// Discord channel ID -> IRC channel name.
    pub channel_mappings: HashMap<String, String>,
    #[serde(default)]
    pub debug: bool,
}

/// Discord bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
    /// Guild snowflake, kept as a string so large IDs survive the config parser.
    pub guild_id: String,
}

/// IRC connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IrcConfig {
    /// `host` or `host:port`.
    pub server: String,
    #[serde(default)]
    pub use_tls: bool,
    /// Nick of the listener connection, e.g. "DiscordBot".
    pub listener_name: String,
    /// Empty disables the WEBIRC handshake.
    #[serde(default)]
    pub webirc_password: String,
    /// Whether Discord presence changes are announced in IRC channels.
    #[serde(default = "default_presence_notices")]
    pub presence_notices: bool,
}

fn default_presence_notices() -> bool {
    true
}

impl Config {
    /// Parsed guild ID, if it is a valid snowflake.
    pub fn guild_id(&self) -> Option<u64> {
        self.discord.guild_id.trim().parse().ok().filter(|id| *id != 0)
    }
}

impl IrcConfig {
    /// Split `server` into host and port, applying the default port for the TLS setting.
    pub fn host_port(&self) -> Option<(String, u16)> {
        let server = self.server.trim();
        if server.is_empty() {
            return None;
        }
        let default_port = if self.use_tls { 6697 } else { 6667 };

        match server.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && !host.contains(':') => {
                let port = port.parse().ok().filter(|p| *p != 0)?;
                Some((host.to_string(), port))
            }
            Some(_) => None,
            None => Some((server.to_string(), default_port)),
        }
    }

    /// WebIRC password, if the handshake is enabled.
    pub fn webirc_password(&self) -> Option<&str> {
        Some(self.webirc_password.as_str()).filter(|p| !p.is_empty())
    }
}

#[cfg(test)]
pub(crate) fn make_test_config() -> Config {
    Config {
        discord: DiscordConfig {
            token: "original_token".to_string(),
            guild_id: "315278744572919808".to_string(),
        },
        irc: IrcConfig {
            server: "irc.example.net".to_string(),
            use_tls: true,
            listener_name: "DiscordBot".to_string(),
            webirc_password: String::new(),
            presence_notices: true,
        },
        channel_mappings: HashMap::from([(
            "315278744572919809".to_string(),
            "#general".to_string(),
        )]),
        debug: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_port_defaults() {
        let mut config = make_test_config();
        assert_eq!(
            config.irc.host_port(),
            Some(("irc.example.net".to_string(), 6697))
        );

        config.irc.use_tls = false;
        assert_eq!(
            config.irc.host_port(),
            Some(("irc.example.net".to_string(), 6667))
        );
    }

    #[test]
    fn test_host_port_explicit() {
        let mut config = make_test_config();
        config.irc.server = "irc.example.net:7000".to_string();
        assert_eq!(
            config.irc.host_port(),
            Some(("irc.example.net".to_string(), 7000))
        );
    }

    #[test]
    fn test_host_port_invalid() {
        let mut config = make_test_config();
        config.irc.server = "irc.example.net:notaport".to_string();
        assert_eq!(config.irc.host_port(), None);

        config.irc.server = "   ".to_string();
        assert_eq!(config.irc.host_port(), None);
    }

    #[test]
    fn test_guild_id_parsing() {
        let mut config = make_test_config();
        assert_eq!(config.guild_id(), Some(315278744572919808));

        config.discord.guild_id = "abc".to_string();
        assert_eq!(config.guild_id(), None);
    }

    #[test]
    fn test_empty_webirc_password_disables_handshake() {
        let mut config = make_test_config();
        assert_eq!(config.irc.webirc_password(), None);

        config.irc.webirc_password = "hunter2".to_string();
        assert_eq!(config.irc.webirc_password(), Some("hunter2"));
    }
}
