//! Bridge lifecycle: wires the adapters to the router and tears them down.

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bridge::channels::{ChannelBundle, DiscordSideChannels, IrcSideChannels};
use crate::bridge::mapping::ChannelMapping;
use crate::bridge::router::{self, CloseRequest, Router};
use crate::common::error::{ConfigError, Result};
use crate::config::types::Config;
use crate::config::validate::validate_config;
use crate::discord::DiscordAdapter;
use crate::irc::{IrcAdapter, IrcSettings};

/// Everything built by `new` and consumed by `open`.
struct Pending {
    router: Router,
    discord: DiscordSideChannels,
    irc: IrcSideChannels,
}

/// A configured Discord-IRC bridge.
pub struct Bridge {
    token: String,
    guild_id: u64,
    irc_settings: IrcSettings,
    pending: Option<Pending>,
    close_tx: Option<oneshot::Sender<CloseRequest>>,
    router_task: Option<JoinHandle<()>>,
}

impl Bridge {
    /// Validate the configuration and build the channel mapping. No network I/O.
    pub fn new(config: Config) -> Result<Self> {
        validate_config(&config)?;

        let mapping = ChannelMapping::build(&config.channel_mappings)?;
        let guild_id = config.guild_id().ok_or_else(|| ConfigError::ValidationError {
            message: format!("invalid discord.guild_id '{}'", config.discord.guild_id),
        })?;
        let irc_settings = IrcSettings::from_config(&config.irc, mapping.irc_channels())?;

        let ChannelBundle {
            router: router_channels,
            discord,
            irc,
        } = ChannelBundle::new();
        let router = Router::new(mapping, router_channels, config.irc.presence_notices);

        Ok(Self {
            token: config.discord.token,
            guild_id,
            irc_settings,
            pending: Some(Pending {
                router,
                discord,
                irc,
            }),
            close_tx: None,
            router_task: None,
        })
    }

    /// Connect both backends and start relaying.
    ///
    /// Fails if Discord's webhooks cannot be listed or the first IRC
    /// connection cannot be made.
    pub async fn open(&mut self) -> Result<()> {
        let Some(Pending {
            mut router,
            discord,
            irc,
        }) = self.pending.take()
        else {
            warn!("Bridge is already open");
            return Ok(());
        };

        info!("Opening Discord session for guild {}...", self.guild_id);
        let discord = DiscordAdapter::open(&self.token, self.guild_id, discord).await?;
        router.set_webhooks(discord.relay_webhooks());

        let irc = IrcAdapter::new(self.irc_settings.clone(), irc);
        let session = irc.connect().await?;

        router.supervise("Discord", tokio::spawn(discord.run()));
        router.supervise("IRC", tokio::spawn(irc.run(session)));

        let (close_tx, close_rx) = oneshot::channel();
        self.close_tx = Some(close_tx);
        self.router_task = Some(tokio::spawn(router.run(close_rx)));

        info!("Bridge open");
        Ok(())
    }

    /// Stop relaying; returns once both adapters have shut down.
    pub async fn close(mut self) {
        let Some(close_tx) = self.close_tx.take() else {
            return;
        };

        info!("Closing bridge...");
        if !router::request_close(close_tx).await {
            warn!("Router had already stopped");
        }
        if let Some(task) = self.router_task.take() {
            if let Err(e) = task.await {
                warn!("Router task failed: {}", e);
            }
        }
        info!("Bridge closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::BridgeError;
    use crate::config::types::make_test_config;

    #[test]
    fn test_new_builds_without_network() {
        let bridge = Bridge::new(make_test_config()).unwrap();
        assert_eq!(bridge.guild_id, 315278744572919808);
        assert_eq!(bridge.irc_settings.channels, vec!["#general".to_string()]);
        assert!(bridge.pending.is_some());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = make_test_config();
        config.channel_mappings.clear();

        match Bridge::new(config) {
            Err(BridgeError::Config(_)) => {}
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("expected a configuration error"),
        }
    }

    #[tokio::test]
    async fn test_close_unopened_bridge_returns() {
        let bridge = Bridge::new(make_test_config()).unwrap();
        bridge.close().await;
    }
}
