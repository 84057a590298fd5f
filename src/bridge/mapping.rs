//! Bidirectional Discord channel <-> IRC channel mapping.
//!
//! Built once from configuration and read-only afterwards. IRC channel
//! names are matched case-insensitively; the configured spelling is kept
//! for joining and display.

use std::collections::HashMap;

use tracing::debug;

use crate::common::error::ConfigError;

/// Bijective association between Discord channel IDs and IRC channels.
#[derive(Debug, Clone)]
pub struct ChannelMapping {
    /// Discord channel ID -> IRC channel as configured.
    discord_to_irc: HashMap<u64, String>,
    /// Lowercased IRC channel -> Discord channel ID.
    irc_to_discord: HashMap<String, u64>,
}

/// Key used for IRC channel lookups.
fn irc_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl ChannelMapping {
    /// Build the mapping from `discord channel ID -> IRC channel` pairs.
    pub fn build(pairs: &HashMap<String, String>) -> Result<Self, ConfigError> {
        if pairs.is_empty() {
            return Err(ConfigError::EmptyMapping);
        }

        let mut discord_to_irc = HashMap::with_capacity(pairs.len());
        let mut irc_to_discord = HashMap::with_capacity(pairs.len());

        for (discord, irc) in pairs {
            let discord_trimmed = discord.trim();
            let irc_trimmed = irc.trim();
            if discord_trimmed.is_empty() || irc_trimmed.is_empty() {
                return Err(ConfigError::EmptyChannel {
                    discord: discord.clone(),
                    irc: irc.clone(),
                });
            }

            let channel_id: u64 = discord_trimmed
                .parse()
                .ok()
                .filter(|id| *id != 0)
                .ok_or_else(|| ConfigError::InvalidChannelId {
                    value: discord.clone(),
                })?;

            if discord_to_irc
                .insert(channel_id, irc_trimmed.to_string())
                .is_some()
            {
                return Err(ConfigError::DuplicateTarget {
                    target: format!("discord channel {}", channel_id),
                });
            }
            if irc_to_discord
                .insert(irc_key(irc_trimmed), channel_id)
                .is_some()
            {
                return Err(ConfigError::DuplicateTarget {
                    target: format!("irc channel {}", irc_trimmed),
                });
            }

            debug!("Mapped Discord channel {} <-> IRC {}", channel_id, irc_trimmed);
        }

        Ok(Self {
            discord_to_irc,
            irc_to_discord,
        })
    }

    /// IRC channel relaying the given Discord channel.
    pub fn lookup_irc(&self, discord_channel_id: u64) -> Option<&str> {
        self.discord_to_irc
            .get(&discord_channel_id)
            .map(String::as_str)
    }

    /// Discord channel relaying the given IRC channel.
    pub fn lookup_discord(&self, irc_channel: &str) -> Option<u64> {
        self.irc_to_discord.get(&irc_key(irc_channel)).copied()
    }

    /// All mapped IRC channels, as configured, sorted.
    pub fn irc_channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.discord_to_irc.values().cloned().collect();
        channels.sort();
        channels
    }

    pub fn len(&self) -> usize {
        self.discord_to_irc.len()
    }
}
