//! Discord adapter.
//!
//! Owns the serenity client and the relay webhooks. Opening it lists the
//! guild's webhooks over REST and waits for the gateway session to become
//! ready; running it supervises the gateway and executes router commands
//! until the shutdown signal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use backon::BackoffBuilder;
use serenity::builder::{CreateAllowedMentions, CreateMessage, ExecuteWebhook};
use serenity::client::ClientBuilder;
use serenity::gateway::{GatewayError, ShardManager};
use serenity::http::{Http, HttpError};
use serenity::model::id::{ChannelId, GuildId};
use serenity::model::webhook::Webhook;
use serenity::prelude::*;
use serenity::Client;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::bridge::channels::DiscordSideChannels;
use crate::bridge::webhooks::{self, WebhookInfo, WebhookMapping};
use crate::common::error::{ConnectionError, ConnectionResult, DiscordError, Result};
use crate::common::text::split_message;
use crate::common::DiscordCommand;
use crate::discord::handler::BridgeHandler;
use crate::discord::normalize::Normalizer;

/// Discord JSON error code for "Missing Permissions".
const MISSING_PERMISSIONS: isize = 50013;

/// Discord's message length limit.
const DISCORD_MAX_LENGTH: usize = 2000;

/// Discord's webhook username limit, in characters.
const WEBHOOK_USERNAME_MAX: usize = 80;

/// Webhook usernames containing these are refused by Discord.
const RESERVED_USERNAME_WORDS: [&str; 2] = ["discord", "clyde"];

/// How long `open` waits for the first gateway `ready`.
const READY_TIMEOUT: Duration = Duration::from_secs(15);

fn intents() -> GatewayIntents {
    GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_PRESENCES
}

async fn build_client(http: Http, handler: BridgeHandler) -> ConnectionResult<Client> {
    ClientBuilder::new_with_http(http, intents())
        .event_handler(handler)
        .await
        .map_err(ConnectionError::Discord)
}

/// Error for a failed webhook listing, if the JSON error code makes it a permission problem.
fn listing_error_for(code: isize, message: &str) -> Option<DiscordError> {
    (code == MISSING_PERMISSIONS).then(|| DiscordError::PermissionDenied {
        message: message.to_string(),
    })
}

fn classify_listing_error(err: serenity::Error) -> DiscordError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &err {
        if let Some(denied) = listing_error_for(response.error.code, &response.error.message) {
            return denied;
        }
    }
    DiscordError::WebhookListing(err)
}

/// Gateway errors that a reconnect cannot fix.
fn is_terminal_gateway_error(err: &serenity::Error) -> bool {
    matches!(
        err,
        serenity::Error::Gateway(
            GatewayError::InvalidAuthentication
                | GatewayError::DisallowedGatewayIntents
                | GatewayError::InvalidGatewayIntents
        )
    )
}

/// Make an IRC nick acceptable as a webhook username.
///
/// Reserved words get a zero-width space after their first letter and the
/// result is cut to Discord's length limit.
fn webhook_username(nick: &str) -> String {
    let mut name = nick.trim().to_string();
    for word in RESERVED_USERNAME_WORDS {
        let mut search_from = 0;
        while let Some(found) = name[search_from..].to_ascii_lowercase().find(word) {
            let at = search_from + found + 1;
            name.insert(at, '\u{200b}');
            search_from = at + '\u{200b}'.len_utf8();
        }
    }
    if name.is_empty() {
        name.push_str("IRC user");
    }
    name.chars().take(WEBHOOK_USERNAME_MAX).collect()
}

/// Exponential backoff for rebuilding the gateway client.
/// 5s initial, 5min max, factor 1.1, with jitter, unlimited retries.
fn discord_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(5))
        .with_max_delay(Duration::from_secs(300))
        .with_factor(1.1)
        .with_jitter()
        .without_max_times()
        .build()
}

/// A started gateway client: the task running `Client::start` and its shard manager.
struct Gateway {
    task: JoinHandle<serenity::Result<()>>,
    shard_manager: Arc<ShardManager>,
}

impl Gateway {
    async fn start(http: Http, handler: BridgeHandler) -> ConnectionResult<Self> {
        let mut client = build_client(http, handler).await?;
        let shard_manager = client.shard_manager.clone();
        let task = tokio::spawn(async move { client.start().await });
        Ok(Self {
            task,
            shard_manager,
        })
    }
}

/// Wait for the first `ready`, or for the gateway task to fail first.
async fn wait_until_ready(
    ready_rx: oneshot::Receiver<()>,
    task: &mut JoinHandle<serenity::Result<()>>,
    timeout: Duration,
) -> ConnectionResult<()> {
    tokio::select! {
        ready = ready_rx => match ready {
            Ok(()) => Ok(()),
            Err(_) => Err(ConnectionError::ConnectionClosed),
        },
        result = &mut *task => match result {
            Ok(Err(e)) => Err(ConnectionError::Discord(e)),
            Ok(Ok(())) => Err(ConnectionError::ConnectionClosed),
            Err(e) => {
                error!("Discord gateway task failed: {}", e);
                Err(ConnectionError::ConnectionClosed)
            }
        },
        _ = sleep(timeout) => Err(ConnectionError::DiscordNotReady {
            seconds: timeout.as_secs(),
        }),
    }
}

pub struct DiscordAdapter {
    token: String,
    handler: BridgeHandler,
    gateway: Gateway,
    http: Arc<Http>,
    /// Relay webhooks by ID; they carry the token needed to post.
    webhooks: HashMap<u64, Webhook>,
    mappings: Vec<WebhookMapping>,
    commands_rx: mpsc::UnboundedReceiver<DiscordCommand>,
    shutdown_rx: watch::Receiver<bool>,
}

impl DiscordAdapter {
    /// List the guild's relay webhooks, then open the gateway and wait for `ready`.
    pub async fn open(token: &str, guild_id: u64, channels: DiscordSideChannels) -> Result<Self> {
        let DiscordSideChannels {
            events_tx,
            commands_rx,
            shutdown_rx,
        } = channels;

        let http = Http::new(token);
        let hooks = GuildId::new(guild_id)
            .webhooks(&http)
            .await
            .map_err(classify_listing_error)?;

        let infos: Vec<WebhookInfo> = hooks
            .iter()
            .map(|hook| WebhookInfo {
                id: hook.id.get(),
                channel_id: hook.channel_id.map(|id| id.get()),
                name: hook.name.clone(),
            })
            .collect();
        let mappings = webhooks::discover(&infos);
        info!("Discovered {} relay webhooks", mappings.len());

        let relay_ids: HashSet<u64> = mappings.iter().map(|m| m.webhook_id).collect();
        let webhooks: HashMap<u64, Webhook> = hooks
            .into_iter()
            .filter(|hook| relay_ids.contains(&hook.id.get()))
            .map(|hook| (hook.id.get(), hook))
            .collect();

        let (ready_tx, ready_rx) = oneshot::channel();
        let handler = BridgeHandler::new(
            guild_id,
            Normalizer::new(guild_id, relay_ids, events_tx),
            ready_tx,
        );

        info!("Connecting to Discord...");
        let mut gateway = Gateway::start(http, handler.clone()).await?;
        if let Err(e) = wait_until_ready(ready_rx, &mut gateway.task, READY_TIMEOUT).await {
            gateway.shard_manager.shutdown_all().await;
            gateway.task.abort();
            return Err(e.into());
        }
        info!("Discord session ready");

        Ok(Self {
            token: token.to_string(),
            handler,
            http: Arc::new(Http::new(token)),
            gateway,
            webhooks,
            mappings,
            commands_rx,
            shutdown_rx,
        })
    }

    /// Webhook identities found on open, for the router.
    pub fn relay_webhooks(&self) -> Vec<WebhookMapping> {
        self.mappings.clone()
    }

    pub async fn run(self) {
        let DiscordAdapter {
            token,
            handler,
            gateway,
            http,
            webhooks,
            commands_rx,
            shutdown_rx,
            ..
        } = self;

        let outbound = Outbound { http, webhooks };

        tokio::select! {
            _ = run_gateway(gateway, &token, handler, shutdown_rx) => {},
            _ = outbound.process(commands_rx) => info!("Discord command channel closed"),
        }
        info!("Discord adapter stopped");
    }
}

/// Wait out a backoff delay; false if shutdown was signalled (or its sender dropped) meanwhile.
async fn backoff_sleep(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = sleep(delay) => true,
        changed = shutdown_rx.changed() => changed.is_ok() && !*shutdown_rx.borrow(),
    }
}

/// Supervise the gateway until shutdown, rebuilding the client if it fails.
async fn run_gateway(
    gateway: Gateway,
    token: &str,
    handler: BridgeHandler,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut gateway = Some(gateway);
    let mut backoff = discord_backoff();

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let Gateway {
            mut task,
            shard_manager,
        } = match gateway.take() {
            Some(gateway) => gateway,
            // serenity resumes on its own; a fresh client follows a failed session
            None => match Gateway::start(Http::new(token), handler.clone()).await {
                Ok(gateway) => {
                    info!("Reconnecting to Discord...");
                    gateway
                }
                Err(e) => {
                    error!("Failed to rebuild Discord client: {}", e);
                    let delay = backoff.next().unwrap_or(Duration::from_secs(300));
                    warn!("Retrying in {:.1}s...", delay.as_secs_f64());
                    if !backoff_sleep(delay, &mut shutdown_rx).await {
                        break;
                    }
                    continue;
                }
            },
        };

        tokio::select! {
            result = &mut task => match result {
                Ok(Ok(())) => {
                    info!("Discord client disconnected normally");
                    break;
                }
                Ok(Err(e)) if is_terminal_gateway_error(&e) => {
                    error!("Discord gateway refused the session, giving up: {}", e);
                    break;
                }
                Ok(Err(e)) => {
                    error!("Discord client error: {}", e);
                    let delay = backoff.next().unwrap_or(Duration::from_secs(300));
                    warn!("Discord disconnected. Reconnecting in {:.1}s...", delay.as_secs_f64());
                    if !backoff_sleep(delay, &mut shutdown_rx).await {
                        break;
                    }
                }
                Err(e) => {
                    error!("Discord gateway task failed: {}", e);
                    break;
                }
            },
            _ = wait_for_shutdown(&mut shutdown_rx) => {
                info!("Initiating graceful Discord shutdown...");
                shard_manager.shutdown_all().await;
                task.abort();
                info!("Discord shutdown complete");
                break;
            }
        }
    }
}

async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Executes router commands over REST.
struct Outbound {
    http: Arc<Http>,
    webhooks: HashMap<u64, Webhook>,
}

impl Outbound {
    async fn process(&self, mut commands_rx: mpsc::UnboundedReceiver<DiscordCommand>) {
        while let Some(command) = commands_rx.recv().await {
            self.execute(command).await;
        }
    }

    /// Failures are logged and the command dropped.
    async fn execute(&self, command: DiscordCommand) {
        match command {
            DiscordCommand::Webhook {
                webhook_id,
                username,
                content,
            } => {
                let Some(hook) = self.webhooks.get(&webhook_id) else {
                    warn!("Unknown relay webhook {}, dropping message", webhook_id);
                    return;
                };
                let name = webhook_username(&username);
                let chunks = split_message(&content, DISCORD_MAX_LENGTH);
                for (index, chunk) in chunks.iter().enumerate() {
                    let builder = ExecuteWebhook::new()
                        .content(chunk.as_str())
                        .username(name.as_str())
                        .allowed_mentions(CreateAllowedMentions::new());
                    if let Err(e) = hook.execute(&self.http, false, builder).await {
                        warn!("Failed to post through webhook {}: {}", webhook_id, e);
                        let Some(channel_id) = hook.channel_id else {
                            return;
                        };
                        info!("Falling back to a bot post in {}", channel_id);
                        let rest = chunks[index..].join(" ");
                        self.send(channel_id.get(), &bot_fallback_content(&username, &rest))
                            .await;
                        return;
                    }
                }
                debug!("IRC -> Discord via webhook {} as {}", webhook_id, name);
            }
            DiscordCommand::Send {
                channel_id,
                content,
            } => self.send(channel_id, &content).await,
        }
    }

    async fn send(&self, channel_id: u64, content: &str) {
        let channel = ChannelId::new(channel_id);
        for chunk in split_message(content, DISCORD_MAX_LENGTH) {
            let builder = CreateMessage::new()
                .content(chunk)
                .allowed_mentions(CreateAllowedMentions::new());
            if let Err(e) = channel.send_message(&self.http, builder).await {
                warn!("Failed to send to Discord channel {}: {}", channel_id, e);
                return;
            }
        }
        debug!("IRC -> Discord [{}]", channel_id);
    }
}

/// Content for a bot post standing in for a webhook post.
fn bot_fallback_content(username: &str, text: &str) -> String {
    format!("<{}> {}", username, text)
}
