//! Turns Discord gateway activity into router events.
//!
//! Nothing here touches serenity directly: the event handler extracts the
//! fields it needs and the guild cache is reached through [`GuildDirectory`],
//! so every rule can be exercised without a gateway.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::common::error::LookupError;
use crate::common::{DiscordEvent, DiscordMessageEvent, UserUpdateEvent};

/// Member fields needed for a presence update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub user_id: u64,
    pub discriminator: Option<u16>,
    pub username: String,
    /// Guild nickname, if set.
    pub nick: Option<String>,
    pub is_bot: bool,
}

impl MemberInfo {
    pub fn display_name(&self) -> String {
        display_name(self.nick.as_deref(), &self.username)
    }
}

/// Guild nickname when set and non-empty, otherwise the account username.
pub fn display_name(nick: Option<&str>, username: &str) -> String {
    match nick {
        Some(nick) if !nick.is_empty() => nick.to_string(),
        _ => username.to_string(),
    }
}

/// Read access to the cached guild state.
pub trait GuildDirectory {
    /// Whether the user is currently online (idle and dnd count as online).
    fn is_online(&self, user_id: u64) -> Result<bool, LookupError>;

    fn member(&self, user_id: u64) -> Result<MemberInfo, LookupError>;
}

/// A guild message reduced to what relaying needs.
#[derive(Debug, Clone, Default)]
pub struct IncomingMessage {
    pub author_id: u64,
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    /// Set when the message was posted through a webhook.
    pub webhook_id: Option<u64>,
    pub display_name: String,
    /// Content with mentions already rendered.
    pub content: String,
    pub attachment_urls: Vec<String>,
}

/// Whether a message asks for the `Pong!` reply. Only the exact text counts.
pub fn is_ping(content: &str) -> bool {
    content == "ping"
}

/// Publishes normalized Discord events to the router.
pub struct Normalizer {
    guild_id: u64,
    /// Relay webhooks; their posts are IRC messages coming back.
    relay_webhooks: HashSet<u64>,
    events_tx: mpsc::UnboundedSender<DiscordEvent>,
}

impl Normalizer {
    pub fn new(
        guild_id: u64,
        relay_webhooks: HashSet<u64>,
        events_tx: mpsc::UnboundedSender<DiscordEvent>,
    ) -> Self {
        Self {
            guild_id,
            relay_webhooks,
            events_tx,
        }
    }

    fn publish(&self, event: DiscordEvent) {
        if let Err(e) = self.events_tx.send(event) {
            warn!("Router is gone, dropping Discord event: {:?}", e.0);
        }
    }

    /// Relay a guild message unless it came from ourselves.
    pub fn handle_message(&self, own_user_id: u64, msg: IncomingMessage) {
        if msg.author_id == own_user_id {
            return;
        }
        if msg
            .webhook_id
            .is_some_and(|id| self.relay_webhooks.contains(&id))
        {
            return;
        }
        if msg.guild_id != Some(self.guild_id) {
            debug!("Ignoring message outside the bridged guild");
            return;
        }

        let mut text = msg.content.trim().to_string();
        for url in &msg.attachment_urls {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(url);
        }
        if text.is_empty() {
            return;
        }

        self.publish(DiscordEvent::Message(DiscordMessageEvent {
            user_id: msg.author_id,
            channel_id: msg.channel_id,
            display_name: msg.display_name,
            text,
        }));
    }

    /// Shared path for member replays, member updates and presence updates.
    ///
    /// Emits nothing when the user's presence is unknown or offline.
    pub fn handle_member_update(&self, directory: &impl GuildDirectory, member: MemberInfo) {
        match directory.is_online(member.user_id) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                debug!("Dropping member update: {}", e);
                return;
            }
        }

        self.publish(DiscordEvent::UserUpdate(UserUpdateEvent {
            user_id: member.user_id,
            discriminator: member.discriminator,
            display_name: member.display_name(),
            is_bot: member.is_bot,
            online: true,
        }));
    }

    /// Offline reports go out immediately; otherwise the member is resolved first.
    pub fn handle_presence_update(
        &self,
        directory: &impl GuildDirectory,
        user_id: u64,
        online: bool,
    ) {
        if !online {
            self.publish(DiscordEvent::UserUpdate(UserUpdateEvent::offline(user_id)));
            return;
        }

        match directory.member(user_id) {
            Ok(member) => self.handle_member_update(directory, member),
            Err(e) => debug!("Dropping presence update: {}", e),
        }
    }
}
