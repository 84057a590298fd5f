//! IRC connection: transport, registration, read loop and reconnection.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use backon::BackoffBuilder;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use crate::bridge::channels::IrcSideChannels;
use crate::common::error::{ConnectionError, ConnectionResult};
use crate::common::text::split_lines;
use crate::common::{IrcCommand, IrcEvent, IrcMessageEvent};
use crate::config::IrcConfig;
use crate::irc::codec::IrcCodec;
use crate::irc::message::{self, IrcLine};

/// Body budget per outgoing line; the server adds our prefix on relay.
const MAX_BODY_LENGTH: usize = 400;

const REALNAME: &str = "Discord IRC bridge";
const QUIT_REASON: &str = "Bridge shutting down";

const WEBIRC_GATEWAY: &str = "dib";
const WEBIRC_HOSTNAME: &str = "localhost";
const WEBIRC_IP: &str = "127.0.0.1";

/// Byte stream the IRC session runs over (plain TCP or TLS).
pub trait IrcTransport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> IrcTransport for T {}

/// Everything needed to (re)connect and register.
#[derive(Debug, Clone)]
pub struct IrcSettings {
    /// Address as configured, for diagnostics.
    pub server: String,
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub nick: String,
    pub webirc_password: Option<String>,
    /// Channels joined after registration.
    pub channels: Vec<String>,
}

impl IrcSettings {
    pub fn from_config(config: &IrcConfig, channels: Vec<String>) -> ConnectionResult<Self> {
        let (host, port) = config
            .host_port()
            .ok_or_else(|| ConnectionError::InvalidAddress {
                address: config.server.clone(),
            })?;

        Ok(Self {
            server: config.server.clone(),
            host,
            port,
            use_tls: config.use_tls,
            nick: config.listener_name.clone(),
            webirc_password: config.webirc_password().map(str::to_string),
            channels,
        })
    }
}

/// One registered connection to the IRC server.
pub struct IrcSession<S> {
    framed: Framed<S, IrcCodec>,
    settings: IrcSettings,
    /// Current nick (may differ from the configured one after a collision).
    nick: String,
    registered: bool,
}

impl<S> IrcSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, settings: IrcSettings) -> Self {
        let nick = settings.nick.clone();
        Self {
            framed: Framed::new(stream, IrcCodec::default()),
            settings,
            nick,
            registered: false,
        }
    }

    async fn send_line(&mut self, line: String) -> io::Result<()> {
        debug!("IRC >> {}", line);
        self.framed.send(line).await
    }

    /// Send the registration burst (WEBIRC when configured, NICK, USER).
    pub async fn register(&mut self) -> io::Result<()> {
        if let Some(password) = self.settings.webirc_password.clone() {
            self.send_line(message::webirc(
                &password,
                WEBIRC_GATEWAY,
                WEBIRC_HOSTNAME,
                WEBIRC_IP,
            ))
            .await?;
        }
        self.send_line(message::nick(&self.nick)).await?;
        let user = message::user(&self.nick, REALNAME);
        self.send_line(user).await
    }

    /// React to one server line; returns a chat event for the router, if any.
    pub async fn handle_line(&mut self, line: IrcLine) -> io::Result<Option<IrcMessageEvent>> {
        match line.command.as_str() {
            "PING" => {
                let token = line.param(0).unwrap_or_default().to_string();
                self.send_line(message::pong(&token)).await?;
            }
            "001" => {
                self.registered = true;
                if let Some(nick) = line.param(0) {
                    self.nick = nick.to_string();
                }
                info!("Registered with IRC as {}", self.nick);
                for channel in self.settings.channels.clone() {
                    self.send_line(message::join(&channel)).await?;
                }
            }
            "433" if !self.registered => {
                warn!("Nick {} is already in use, trying {}_", self.nick, self.nick);
                self.nick.push('_');
                let nick = message::nick(&self.nick);
                self.send_line(nick).await?;
            }
            "JOIN" => {
                if line.nick() == Some(self.nick.as_str()) {
                    info!("Joined IRC channel {}", line.param(0).unwrap_or_default());
                }
            }
            "KICK" => {
                if line.param(1) == Some(self.nick.as_str()) {
                    let channel = line.param(0).unwrap_or_default().to_string();
                    warn!("Kicked from {}, rejoining", channel);
                    self.send_line(message::join(&channel)).await?;
                }
            }
            "ERROR" => {
                warn!("IRC server error: {}", line.param(0).unwrap_or_default());
            }
            "PRIVMSG" => return Ok(self.chat_event(&line)),
            _ => {}
        }
        Ok(None)
    }

    fn chat_event(&self, line: &IrcLine) -> Option<IrcMessageEvent> {
        let nick = line.nick()?;
        let target = line.param(0)?;
        let text = line.param(1)?;

        if nick.eq_ignore_ascii_case(&self.nick) {
            return None;
        }
        if !message::is_channel(target) {
            debug!("Ignoring private message from {}", nick);
            return None;
        }

        let text = match message::ctcp_action(text) {
            Some(action) => format!("_{}_", message::strip_formatting(action)),
            None if message::is_ctcp(text) => return None,
            None => message::strip_formatting(text),
        };
        if text.trim().is_empty() {
            return None;
        }

        Some(IrcMessageEvent {
            nick: nick.to_string(),
            channel: target.to_string(),
            text,
        })
    }

    /// Execute a router command on this connection.
    pub async fn execute(&mut self, command: IrcCommand) -> io::Result<()> {
        match command {
            IrcCommand::Privmsg {
                channel,
                sender,
                text,
            } => {
                let budget = MAX_BODY_LENGTH.saturating_sub(sender.len() + 3).max(64);
                for chunk in split_lines(&text, budget) {
                    let body = format!("<{}> {}", sender, chunk);
                    self.send_line(message::privmsg(&channel, &body)).await?;
                }
            }
            IrcCommand::Notice { channel, text } => {
                for chunk in split_lines(&text, MAX_BODY_LENGTH) {
                    self.send_line(message::notice(&channel, &chunk)).await?;
                }
            }
        }
        Ok(())
    }

    async fn quit(&mut self) -> io::Result<()> {
        self.send_line(message::quit(QUIT_REASON)).await
    }

    /// Pump lines and commands until shutdown (QUIT sent) or disconnect.
    pub async fn drive(
        &mut self,
        events_tx: &mpsc::UnboundedSender<IrcEvent>,
        commands_rx: &mut mpsc::UnboundedReceiver<IrcCommand>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> ConnectionResult<()> {
        loop {
            tokio::select! {
                line = self.framed.next() => {
                    let raw = match line {
                        Some(Ok(raw)) => raw,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(ConnectionError::ConnectionClosed),
                    };
                    debug!("IRC << {}", raw);

                    match IrcLine::parse(&raw) {
                        Some(line) => {
                            if let Some(event) = self.handle_line(line).await? {
                                if events_tx.send(IrcEvent::Message(event)).is_err() {
                                    warn!("Router is gone, closing IRC session");
                                    self.quit().await?;
                                    return Ok(());
                                }
                            }
                        }
                        None => debug!("Unparseable IRC line: {}", raw),
                    }
                }

                command = commands_rx.recv() => {
                    match command {
                        Some(command) => self.execute(command).await?,
                        None => {
                            self.quit().await?;
                            return Ok(());
                        }
                    }
                }

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received, leaving IRC");
                        self.quit().await?;
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Exponential backoff for reconnection.
/// 5s initial, 5min max, factor 1.1, with jitter, unlimited retries.
fn irc_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(5))
        .with_max_delay(Duration::from_secs(300))
        .with_factor(1.1)
        .with_jitter()
        .without_max_times()
        .build()
}

fn tls_connector() -> ConnectionResult<TlsConnector> {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for cert in native.certs {
        if let Err(e) = roots.add(cert) {
            warn!("Failed to add root cert: {}", e);
        }
    }
    for e in &native.errors {
        warn!("Error loading native certs: {}", e);
    }

    let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ConnectionError::Tls {
            message: e.to_string(),
        })?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

async fn open_transport(settings: &IrcSettings) -> ConnectionResult<Box<dyn IrcTransport>> {
    info!(
        "Connecting to IRC server {}:{} (tls: {})",
        settings.host, settings.port, settings.use_tls
    );

    let tcp = TcpStream::connect((settings.host.as_str(), settings.port))
        .await
        .map_err(|source| ConnectionError::Irc {
            server: settings.server.clone(),
            source,
        })?;
    if !settings.use_tls {
        return Ok(Box::new(tcp));
    }

    let server_name =
        ServerName::try_from(settings.host.clone()).map_err(|e| ConnectionError::Tls {
            message: e.to_string(),
        })?;
    let stream = tls_connector()?
        .connect(server_name, tcp)
        .await
        .map_err(|source| ConnectionError::Irc {
            server: settings.server.clone(),
            source,
        })?;
    Ok(Box::new(stream))
}

/// Open the transport and send the registration burst.
pub async fn connect(settings: &IrcSettings) -> ConnectionResult<IrcSession<Box<dyn IrcTransport>>> {
    let stream = open_transport(settings).await?;
    let mut session = IrcSession::new(stream, settings.clone());
    session
        .register()
        .await
        .map_err(|source| ConnectionError::Irc {
            server: settings.server.clone(),
            source,
        })?;
    Ok(session)
}

/// The IRC side of the bridge.
pub struct IrcAdapter {
    settings: IrcSettings,
    channels: IrcSideChannels,
}

impl IrcAdapter {
    pub fn new(settings: IrcSettings, channels: IrcSideChannels) -> Self {
        Self { settings, channels }
    }

    /// Connect for the first time; failures go back to the caller.
    pub async fn connect(&self) -> ConnectionResult<IrcSession<Box<dyn IrcTransport>>> {
        connect(&self.settings).await
    }

    /// Read loop. Reconnects with backoff until shutdown is signalled.
    pub async fn run(self, session: IrcSession<Box<dyn IrcTransport>>) {
        let IrcAdapter {
            settings,
            channels:
                IrcSideChannels {
                    events_tx,
                    mut commands_rx,
                    mut shutdown_rx,
                },
        } = self;

        let mut session = Some(session);
        let mut backoff = irc_backoff();

        loop {
            if let Some(mut active) = session.take() {
                match active
                    .drive(&events_tx, &mut commands_rx, &mut shutdown_rx)
                    .await
                {
                    Ok(()) => break,
                    Err(ConnectionError::ConnectionClosed) => {
                        warn!("IRC server closed the connection")
                    }
                    Err(e) => error!("IRC connection error: {}", e),
                }
            }
            if *shutdown_rx.borrow() {
                break;
            }

            let delay = backoff.next().unwrap_or(Duration::from_secs(300));
            info!("Reconnecting to IRC in {:.1} seconds...", delay.as_secs_f64());

            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            let stop = loop {
                tokio::select! {
                    _ = &mut sleep => break false,
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break true;
                        }
                    }
                    command = commands_rx.recv() => match command {
                        Some(command) => debug!("IRC disconnected, dropping {:?}", command),
                        None => break true,
                    },
                }
            };
            if stop {
                break;
            }

            match connect(&settings).await {
                Ok(reconnected) => {
                    backoff = irc_backoff();
                    session = Some(reconnected);
                }
                Err(e) => error!("IRC reconnect failed: {}", e),
            }
        }

        info!("IRC adapter stopped");
    }
}
