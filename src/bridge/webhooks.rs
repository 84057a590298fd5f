//! Relay webhook discovery.
//!
//! A guild webhook named `IRC: #<channel>` is the posting identity used for
//! messages relayed from that IRC channel. The prefix rule is kept exactly
//! as existing deployments name their webhooks.

use tracing::{info, warn};

/// Names of relay webhooks start with this.
const WEBHOOK_PREFIX: &str = "IRC: #";
/// Stripped from the name to get the IRC channel (keeps the `#`).
const WEBHOOK_STRIP: &str = "IRC: ";

/// The parts of a Discord webhook discovery looks at.
#[derive(Debug, Clone)]
pub struct WebhookInfo {
    pub id: u64,
    pub channel_id: Option<u64>,
    pub name: Option<String>,
}

/// A webhook identity mirroring one IRC channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookMapping {
    pub webhook_id: u64,
    /// Discord channel the webhook posts into.
    pub channel_id: u64,
    /// IRC channel, e.g. `#general`.
    pub irc_channel: String,
}

/// IRC channel mirrored by a webhook of the given name, if it follows the convention.
pub fn irc_channel_for(name: &str) -> Option<&str> {
    if name.starts_with(WEBHOOK_PREFIX) {
        name.strip_prefix(WEBHOOK_STRIP)
    } else {
        None
    }
}

/// Keep the webhooks following the relay naming convention.
pub fn discover<'a>(hooks: impl IntoIterator<Item = &'a WebhookInfo>) -> Vec<WebhookMapping> {
    let mut mappings = Vec::new();

    for hook in hooks {
        let Some(irc_channel) = hook.name.as_deref().and_then(irc_channel_for) else {
            continue;
        };
        let Some(channel_id) = hook.channel_id else {
            warn!("Webhook {} ({}) has no channel, skipping", hook.id, irc_channel);
            continue;
        };

        info!("Relay webhook {}:{}", channel_id, irc_channel);
        mappings.push(WebhookMapping {
            webhook_id: hook.id,
            channel_id,
            irc_channel: irc_channel.to_string(),
        });
    }

    mappings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hook(id: u64, name: &str) -> WebhookInfo {
        WebhookInfo {
            id,
            channel_id: Some(id * 10),
            name: Some(name.to_string()),
        }
    }

    #[test]
    fn test_discovery_filters_by_prefix() {
        let hooks = vec![
            hook(1, "IRC: #general"),
            hook(2, "IRC: #ops"),
            hook(3, "announcements"),
        ];

        let mappings = discover(&hooks);

        assert_eq!(
            mappings,
            vec![
                WebhookMapping {
                    webhook_id: 1,
                    channel_id: 10,
                    irc_channel: "#general".to_string(),
                },
                WebhookMapping {
                    webhook_id: 2,
                    channel_id: 20,
                    irc_channel: "#ops".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_prefix_is_exact() {
        assert_eq!(irc_channel_for("IRC: #chat"), Some("#chat"));
        assert_eq!(irc_channel_for("IRC: chat"), None);
        assert_eq!(irc_channel_for("irc: #chat"), None);
        assert_eq!(irc_channel_for("IRC:#chat"), None);
        assert_eq!(irc_channel_for(" IRC: #chat"), None);
    }

    #[test]
    fn test_unnamed_or_channelless_hooks_skipped() {
        let hooks = vec![
            WebhookInfo {
                id: 1,
                channel_id: Some(10),
                name: None,
            },
            WebhookInfo {
                id: 2,
                channel_id: None,
                name: Some("IRC: #general".to_string()),
            },
        ];
        assert!(discover(&hooks).is_empty());
    }
}
