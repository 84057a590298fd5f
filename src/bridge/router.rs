//! The router: single owner of cross-backend state.
//!
//! Drains both adapters' event channels on one task, so the channel
//! mapping, webhook identities and presence store need no locking. Commands
//! go back out through each adapter's command channel.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::channels::RouterChannels;
use crate::bridge::mapping::ChannelMapping;
use crate::bridge::presence::PresenceStore;
use crate::bridge::webhooks::WebhookMapping;
use crate::common::{
    DiscordCommand, DiscordEvent, DiscordMessageEvent, IrcCommand, IrcEvent, IrcMessageEvent,
    UserUpdateEvent,
};

/// Acknowledgment slot sent along with a close request.
pub type CloseRequest = oneshot::Sender<()>;

/// How long each adapter gets to finish after the shutdown signal.
const ADAPTER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Running,
    Closing,
}

pub struct Router {
    state: RouterState,
    mapping: ChannelMapping,
    /// Relay webhooks keyed by lowercased IRC channel.
    webhooks: HashMap<String, WebhookMapping>,
    presence: PresenceStore,
    presence_notices: bool,
    channels: RouterChannels,
    /// Adapter tasks awaited on close.
    adapters: Vec<(&'static str, JoinHandle<()>)>,
}

impl Router {
    pub fn new(mapping: ChannelMapping, channels: RouterChannels, presence_notices: bool) -> Self {
        Self {
            state: RouterState::Running,
            mapping,
            webhooks: HashMap::new(),
            presence: PresenceStore::new(),
            presence_notices,
            channels,
            adapters: Vec::new(),
        }
    }

    /// Install the webhook identities discovered when Discord opened.
    ///
    /// A webhook is only used when its channel is the one mapped to its IRC channel.
    pub fn set_webhooks(&mut self, mappings: Vec<WebhookMapping>) {
        self.webhooks.clear();

        for hook in mappings {
            match self.mapping.lookup_discord(&hook.irc_channel) {
                Some(channel_id) if channel_id == hook.channel_id => {
                    self.webhooks
                        .insert(hook.irc_channel.to_ascii_lowercase(), hook);
                }
                Some(channel_id) => warn!(
                    "Webhook for {} posts into channel {} but {} is mapped to {}, ignoring it",
                    hook.irc_channel, hook.channel_id, hook.irc_channel, channel_id
                ),
                None => warn!(
                    "Webhook for {} has no channel mapping, ignoring it",
                    hook.irc_channel
                ),
            }
        }

        info!(
            "{} of {} mapped channels relay through webhooks",
            self.webhooks.len(),
            self.mapping.len()
        );
    }

    /// Register an adapter task that must finish before close is acknowledged.
    pub fn supervise(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.adapters.push((name, handle));
    }

    /// Run until a close request arrives (or the bridge is dropped).
    pub async fn run(mut self, mut close_rx: oneshot::Receiver<CloseRequest>) {
        info!("Router running with {} channel pairs", self.mapping.len());
        let mut ack = None;

        while self.state == RouterState::Running {
            tokio::select! {
                biased;

                request = &mut close_rx => {
                    // Err means the bridge was dropped without closing
                    ack = request.ok();
                    self.state = RouterState::Closing;
                }

                Some(event) = self.channels.discord_rx.recv() => {
                    self.handle_discord_event(event);
                }

                Some(event) = self.channels.irc_rx.recv() => {
                    self.handle_irc_event(event);
                }
            }
        }

        self.stop_adapters().await;

        if let Some(ack) = ack {
            if ack.send(()).is_err() {
                debug!("Close requester went away before the acknowledgment");
            }
        }
        info!("Router stopped");
    }

    async fn stop_adapters(&mut self) {
        info!("Router closing, stopping adapters...");
        if self.channels.shutdown_tx.send(true).is_err() {
            debug!("No adapter is listening for shutdown");
        }

        for (name, mut handle) in self.adapters.drain(..) {
            match tokio::time::timeout(ADAPTER_STOP_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => info!("{} adapter stopped", name),
                Ok(Err(e)) => warn!("{} adapter task failed: {}", name, e),
                Err(_) => {
                    warn!("{} adapter did not stop in time, aborting it", name);
                    handle.abort();
                }
            }
        }
    }

    fn handle_discord_event(&mut self, event: DiscordEvent) {
        match event {
            DiscordEvent::Message(message) => self.relay_discord_message(message),
            DiscordEvent::UserUpdate(update) => self.handle_user_update(update),
        }
    }

    fn handle_irc_event(&mut self, event: IrcEvent) {
        match event {
            IrcEvent::Message(message) => self.relay_irc_message(message),
        }
    }

    fn relay_discord_message(&self, message: DiscordMessageEvent) {
        let Some(channel) = self.mapping.lookup_irc(message.channel_id) else {
            debug!(
                "No IRC channel mapped for Discord channel {}, dropping message",
                message.channel_id
            );
            return;
        };

        info!(
            "Discord -> IRC [{}] <{}> {}",
            channel, message.display_name, message.text
        );
        self.send_irc(IrcCommand::Privmsg {
            channel: channel.to_string(),
            sender: message.display_name,
            text: message.text,
        });
    }

    fn relay_irc_message(&self, message: IrcMessageEvent) {
        let Some(channel_id) = self.mapping.lookup_discord(&message.channel) else {
            debug!(
                "No Discord channel mapped for IRC {}, dropping message",
                message.channel
            );
            return;
        };

        info!(
            "IRC -> Discord [{}] <{}> {}",
            message.channel, message.nick, message.text
        );
        let command = match self.webhooks.get(&message.channel.to_ascii_lowercase()) {
            Some(hook) => DiscordCommand::Webhook {
                webhook_id: hook.webhook_id,
                username: message.nick,
                content: message.text,
            },
            None => DiscordCommand::Send {
                channel_id,
                content: format!("<{}> {}", message.nick, message.text),
            },
        };
        self.send_discord(command);
    }

    /// Presence flows Discord -> IRC only; IRC has nothing to push back.
    fn handle_user_update(&mut self, update: UserUpdateEvent) {
        let user_id = update.user_id;
        let name_while_online = self
            .presence
            .get(user_id)
            .filter(|record| record.online)
            .map(|record| record.display_name.clone());

        let changed = self.presence.update(update.into());

        let Some(record) = self.presence.get(user_id) else {
            return;
        };
        if !self.presence_notices || record.is_bot || record.display_name.is_empty() {
            return;
        }

        let notice = if changed {
            let state = if record.online { "online" } else { "offline" };
            format!("{} is now {}", record.display_name, state)
        } else {
            match name_while_online {
                Some(old) if record.online && !old.is_empty() && old != record.display_name => {
                    format!("{} is now known as {}", old, record.display_name)
                }
                _ => return,
            }
        };

        debug!(
            "Presence notice for {} ({}): {} ({} users online)",
            record.tag(),
            record.user_id,
            notice,
            self.presence.online_count()
        );
        for channel in self.mapping.irc_channels() {
            self.send_irc(IrcCommand::Notice {
                channel,
                text: notice.clone(),
            });
        }
    }

    fn send_irc(&self, command: IrcCommand) {
        if self.channels.irc_cmd_tx.send(command).is_err() {
            warn!("IRC adapter is gone, dropping command");
        }
    }

    fn send_discord(&self, command: DiscordCommand) {
        if self.channels.discord_cmd_tx.send(command).is_err() {
            warn!("Discord adapter is gone, dropping command");
        }
    }
}

/// Ask the router to close and wait for its acknowledgment.
///
/// Returns false if the router had already stopped.
pub async fn request_close(close_tx: oneshot::Sender<CloseRequest>) -> bool {
    let (ack_tx, ack_rx) = oneshot::channel();
    if close_tx.send(ack_tx).is_err() {
        return false;
    }
    ack_rx.await.is_ok()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use tokio::sync::{mpsc, watch};

    use super::*;
    use crate::bridge::channels::ChannelBundle;

    struct AdapterSides {
        discord_tx: mpsc::UnboundedSender<DiscordEvent>,
        irc_tx: mpsc::UnboundedSender<IrcEvent>,
        discord_cmd_rx: mpsc::UnboundedReceiver<DiscordCommand>,
        irc_cmd_rx: mpsc::UnboundedReceiver<IrcCommand>,
        shutdown_rx: watch::Receiver<bool>,
    }

    fn setup(pairs: &[(&str, &str)]) -> (Router, AdapterSides) {
        let pairs = pairs
            .iter()
            .map(|(d, i)| (d.to_string(), i.to_string()))
            .collect();
        let mapping = ChannelMapping::build(&pairs).unwrap();
        let bundle = ChannelBundle::new();
        let router = Router::new(mapping, bundle.router, true);

        let sides = AdapterSides {
            discord_tx: bundle.discord.events_tx,
            irc_tx: bundle.irc.events_tx,
            discord_cmd_rx: bundle.discord.commands_rx,
            irc_cmd_rx: bundle.irc.commands_rx,
            shutdown_rx: bundle.irc.shutdown_rx,
        };
        (router, sides)
    }

    fn discord_message(channel_id: u64, name: &str, text: &str) -> DiscordEvent {
        DiscordEvent::Message(DiscordMessageEvent {
            user_id: 42,
            channel_id,
            display_name: name.to_string(),
            text: text.to_string(),
        })
    }

    fn irc_message(channel: &str, nick: &str, text: &str) -> IrcEvent {
        IrcEvent::Message(IrcMessageEvent {
            nick: nick.to_string(),
            channel: channel.to_string(),
            text: text.to_string(),
        })
    }

    fn online(user_id: u64, name: &str) -> DiscordEvent {
        DiscordEvent::UserUpdate(UserUpdateEvent {
            user_id,
            discriminator: None,
            display_name: name.to_string(),
            is_bot: false,
            online: true,
        })
    }

    fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_discord_message_relayed_once() {
        let (mut router, mut sides) = setup(&[("1", "#chat")]);

        router.handle_discord_event(discord_message(1, "Bob", "hello"));

        assert_eq!(
            drain(&mut sides.irc_cmd_rx),
            vec![IrcCommand::Privmsg {
                channel: "#chat".to_string(),
                sender: "Bob".to_string(),
                text: "hello".to_string(),
            }]
        );
        assert!(drain(&mut sides.discord_cmd_rx).is_empty());
    }

    #[test]
    fn test_unmapped_discord_channel_dropped() {
        let (mut router, mut sides) = setup(&[("1", "#chat")]);

        router.handle_discord_event(discord_message(9, "Bob", "hello"));

        assert!(drain(&mut sides.irc_cmd_rx).is_empty());
    }

    #[test]
    fn test_irc_message_uses_webhook() {
        let (mut router, mut sides) = setup(&[("1", "#chat")]);
        router.set_webhooks(vec![WebhookMapping {
            webhook_id: 77,
            channel_id: 1,
            irc_channel: "#chat".to_string(),
        }]);

        router.handle_irc_event(irc_message("#Chat", "alice", "hi there"));

        assert_eq!(
            drain(&mut sides.discord_cmd_rx),
            vec![DiscordCommand::Webhook {
                webhook_id: 77,
                username: "alice".to_string(),
                content: "hi there".to_string(),
            }]
        );
    }

    #[test]
    fn test_irc_message_without_webhook_falls_back() {
        let (mut router, mut sides) = setup(&[("1", "#chat")]);
        // webhook points at a different Discord channel than the mapping
        router.set_webhooks(vec![WebhookMapping {
            webhook_id: 77,
            channel_id: 2,
            irc_channel: "#chat".to_string(),
        }]);

        router.handle_irc_event(irc_message("#chat", "alice", "hi"));
        router.handle_irc_event(irc_message("#elsewhere", "alice", "hi"));

        assert_eq!(
            drain(&mut sides.discord_cmd_rx),
            vec![DiscordCommand::Send {
                channel_id: 1,
                content: "<alice> hi".to_string(),
            }]
        );
    }

    #[test]
    fn test_presence_notices_deduplicated() {
        let (mut router, mut sides) = setup(&[("1", "#chat"), ("2", "#ops")]);

        router.handle_discord_event(online(5, "Bob"));
        router.handle_discord_event(online(5, "Bob"));

        let notices = drain(&mut sides.irc_cmd_rx);
        assert_eq!(
            notices,
            vec![
                IrcCommand::Notice {
                    channel: "#chat".to_string(),
                    text: "Bob is now online".to_string(),
                },
                IrcCommand::Notice {
                    channel: "#ops".to_string(),
                    text: "Bob is now online".to_string(),
                },
            ]
        );

        router.handle_discord_event(DiscordEvent::UserUpdate(UserUpdateEvent::offline(5)));
        let notices = drain(&mut sides.irc_cmd_rx);
        assert_eq!(notices.len(), 2);
        assert!(notices.iter().all(|n| matches!(
            n,
            IrcCommand::Notice { text, .. } if text == "Bob is now offline"
        )));

        // presence never goes to Discord
        assert!(drain(&mut sides.discord_cmd_rx).is_empty());
    }

    #[test]
    fn test_unknown_offline_user_is_silent() {
        let (mut router, mut sides) = setup(&[("1", "#chat")]);

        router.handle_discord_event(DiscordEvent::UserUpdate(UserUpdateEvent::offline(5)));

        assert!(drain(&mut sides.irc_cmd_rx).is_empty());
    }

    #[test]
    fn test_bots_are_silent() {
        let (mut router, mut sides) = setup(&[("1", "#chat")]);

        router.handle_discord_event(DiscordEvent::UserUpdate(UserUpdateEvent {
            user_id: 5,
            discriminator: None,
            display_name: "HelperBot".to_string(),
            is_bot: true,
            online: true,
        }));

        assert!(drain(&mut sides.irc_cmd_rx).is_empty());
    }

    #[test]
    fn test_rename_while_online_announced() {
        let (mut router, mut sides) = setup(&[("1", "#chat")]);

        router.handle_discord_event(online(5, "Bob"));
        drain(&mut sides.irc_cmd_rx);

        router.handle_discord_event(online(5, "Robert"));

        assert_eq!(
            drain(&mut sides.irc_cmd_rx),
            vec![IrcCommand::Notice {
                channel: "#chat".to_string(),
                text: "Bob is now known as Robert".to_string(),
            }]
        );
    }

    #[test]
    fn test_presence_notices_disabled() {
        let (router, mut sides) = setup(&[("1", "#chat")]);
        let mut router = Router {
            presence_notices: false,
            ..router
        };

        router.handle_discord_event(online(5, "Bob"));

        assert!(drain(&mut sides.irc_cmd_rx).is_empty());
        assert!(router.presence.get(5).is_some());
    }

    #[tokio::test]
    async fn test_run_dispatches_until_closed() {
        let (router, mut sides) = setup(&[("1", "#chat")]);
        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(router.run(close_rx));

        sides.irc_tx.send(irc_message("#chat", "alice", "hi")).unwrap();
        let command = sides.discord_cmd_rx.recv().await.unwrap();
        assert!(matches!(command, DiscordCommand::Send { channel_id: 1, .. }));

        assert!(request_close(close_tx).await);
        task.await.unwrap();
        assert!(*sides.shutdown_rx.borrow());
    }

    #[tokio::test]
    async fn test_close_waits_for_adapters_under_load() {
        let (mut router, sides) = setup(&[("1", "#chat")]);
        let stopped = Arc::new(AtomicBool::new(false));

        let producer = {
            let tx = sides.discord_tx.clone();
            let mut shutdown_rx = sides.shutdown_rx.clone();
            let stopped = stopped.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        _ = tokio::task::yield_now() => {
                            let _ = tx.send(discord_message(1, "Bob", "spam"));
                        }
                    }
                }
                stopped.store(true, Ordering::SeqCst);
            })
        };
        router.supervise("discord", producer);

        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(router.run(close_rx));
        tokio::task::yield_now().await;

        assert!(request_close(close_tx).await);
        assert!(stopped.load(Ordering::SeqCst));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_after_router_stopped() {
        let (router, _sides) = setup(&[("1", "#chat")]);
        let (close_tx, close_rx) = oneshot::channel();
        drop(close_rx);
        drop(router);

        assert!(!request_close(close_tx).await);
    }
}
