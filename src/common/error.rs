//! Error types for the bridge.

use thiserror::Error;

/// Top-level bridge error.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Discord error: {0}")]
    Discord(#[from] DiscordError),
}

impl BridgeError {
    /// Whether the bot lacks the guild permission needed to list webhooks.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, BridgeError::Discord(DiscordError::PermissionDenied { .. }))
    }
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {message}")]
    IoError { path: String, message: String },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },

    #[error("No channel mappings configured")]
    EmptyMapping,

    #[error("Channel mapping has an empty side: discord '{discord}' -> irc '{irc}'")]
    EmptyChannel { discord: String, irc: String },

    #[error("Invalid Discord channel ID '{value}'")]
    InvalidChannelId { value: String },

    #[error("Duplicate channel mapping target: {target}")]
    DuplicateTarget { target: String },
}

/// Errors opening one of the backends.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to open Discord session: {0}")]
    Discord(#[source] serenity::Error),

    #[error("Discord session was not ready after {seconds}s")]
    DiscordNotReady { seconds: u64 },

    #[error("Failed to connect to IRC server {server}: {source}")]
    Irc {
        server: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS error: {message}")]
    Tls { message: String },

    #[error("Invalid server address '{address}'")]
    InvalidAddress { address: String },

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Discord-related errors.
#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Failed to list guild webhooks: {0}")]
    WebhookListing(#[source] serenity::Error),
}

/// Failure resolving a member or presence from the gateway cache.
///
/// Always recovered locally: the update that needed it is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("Guild {guild_id} is not cached")]
    GuildNotCached { guild_id: u64 },

    #[error("Member {user_id} not found")]
    MemberNotFound { user_id: u64 },

    #[error("No presence for user {user_id}")]
    PresenceNotFound { user_id: u64 },
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Result type alias for connection operations.
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_detection() {
        let err = BridgeError::from(DiscordError::PermissionDenied {
            message: "Missing Permissions".to_string(),
        });
        assert!(err.is_permission_denied());

        let err = BridgeError::from(ConfigError::EmptyMapping);
        assert!(!err.is_permission_denied());
    }

    #[test]
    fn test_irc_error_names_server() {
        let err = ConnectionError::Irc {
            server: "irc.example.net:6697".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.to_string().contains("irc.example.net:6697"));
    }
}
