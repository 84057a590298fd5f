//! Bridge channel management.
//!
//! Every adapter gets only its own side of the bundle: an event sender into
//! the router, a command receiver out of it, and the shutdown signal.

use tokio::sync::{mpsc, watch};

use crate::common::{DiscordCommand, DiscordEvent, IrcCommand, IrcEvent};

/// Channels owned by the router task.
pub struct RouterChannels {
    /// Receiver for Discord -> router events.
    pub discord_rx: mpsc::UnboundedReceiver<DiscordEvent>,
    /// Receiver for IRC -> router events.
    pub irc_rx: mpsc::UnboundedReceiver<IrcEvent>,
    /// Sender for router -> Discord commands.
    pub discord_cmd_tx: mpsc::UnboundedSender<DiscordCommand>,
    /// Sender for router -> IRC commands.
    pub irc_cmd_tx: mpsc::UnboundedSender<IrcCommand>,
    /// Sender to stop the adapters.
    pub shutdown_tx: watch::Sender<bool>,
}

/// Channels for the Discord adapter.
pub struct DiscordSideChannels {
    /// Sender for events (gateway callbacks publish here).
    pub events_tx: mpsc::UnboundedSender<DiscordEvent>,
    /// Receiver for commands to execute.
    pub commands_rx: mpsc::UnboundedReceiver<DiscordCommand>,
    /// Receiver for the shutdown signal.
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Channels for the IRC adapter.
pub struct IrcSideChannels {
    /// Sender for events (the read loop publishes here).
    pub events_tx: mpsc::UnboundedSender<IrcEvent>,
    /// Receiver for commands to execute.
    pub commands_rx: mpsc::UnboundedReceiver<IrcCommand>,
    /// Receiver for the shutdown signal.
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Bundle of all channels created by the bridge.
pub struct ChannelBundle {
    pub router: RouterChannels,
    pub discord: DiscordSideChannels,
    pub irc: IrcSideChannels,
}

impl ChannelBundle {
    /// Create a new set of bridge channels.
    ///
    /// Queues are unbounded so gateway callbacks never wait on the router.
    pub fn new() -> Self {
        let (discord_tx, discord_rx) = mpsc::unbounded_channel();
        let (irc_tx, irc_rx) = mpsc::unbounded_channel();
        let (discord_cmd_tx, discord_cmd_rx) = mpsc::unbounded_channel();
        let (irc_cmd_tx, irc_cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            router: RouterChannels {
                discord_rx,
                irc_rx,
                discord_cmd_tx,
                irc_cmd_tx,
                shutdown_tx,
            },
            discord: DiscordSideChannels {
                events_tx: discord_tx,
                commands_rx: discord_cmd_rx,
                shutdown_rx: shutdown_rx.clone(),
            },
            irc: IrcSideChannels {
                events_tx: irc_tx,
                commands_rx: irc_cmd_rx,
                shutdown_rx,
            },
        }
    }
}

impl Default for ChannelBundle {
    fn default() -> Self {
        Self::new()
    }
}
