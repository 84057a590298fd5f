//! Canonical event and command types exchanged with the router.
//!
//! Adapters publish events into the router and receive commands back;
//! neither side references the other directly.

/// Chat message seen in a Discord channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscordMessageEvent {
    /// Author's user ID.
    pub user_id: u64,
    /// Channel the message was posted in.
    pub channel_id: u64,
    /// Author's display name (guild nickname or username).
    pub display_name: String,
    /// Message text, attachments appended.
    pub text: String,
}

/// Chat message seen in an IRC channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessageEvent {
    /// Sender's IRC nick.
    pub nick: String,
    /// Channel the message was sent to.
    pub channel: String,
    /// Message text.
    pub text: String,
}

/// Presence or member state of a Discord user.
///
/// Offline transitions may arrive as a minimal update carrying only the
/// user ID and `online = false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdateEvent {
    pub user_id: u64,
    pub discriminator: Option<u16>,
    pub display_name: String,
    pub is_bot: bool,
    pub online: bool,
}

impl UserUpdateEvent {
    /// Minimal update reporting a user went offline.
    pub fn offline(user_id: u64) -> Self {
        Self {
            user_id,
            online: false,
            ..Default::default()
        }
    }
}

/// Events published by the Discord adapter.
#[derive(Debug, Clone)]
pub enum DiscordEvent {
    Message(DiscordMessageEvent),
    UserUpdate(UserUpdateEvent),
}

/// Events published by the IRC adapter.
#[derive(Debug, Clone)]
pub enum IrcEvent {
    Message(IrcMessageEvent),
}

/// Commands executed by the Discord adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscordCommand {
    /// Post through a relay webhook under the given username.
    Webhook {
        webhook_id: u64,
        username: String,
        content: String,
    },
    /// Post as the bot account.
    Send { channel_id: u64, content: String },
}

/// Commands executed by the IRC adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcCommand {
    /// Relay a chat message on behalf of `sender`.
    Privmsg {
        channel: String,
        sender: String,
        text: String,
    },
    /// Send a notice to a channel.
    Notice { channel: String, text: String },
}
