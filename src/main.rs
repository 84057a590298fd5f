//! dib - Discord-IRC chat bridge
//!
//! Relays messages between paired Discord and IRC channels and announces
//! Discord presence changes in IRC.

mod bridge;
mod common;
mod config;
mod discord;
mod irc;

use anyhow::Result;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter};

use bridge::Bridge;
use config::env::get_config_path;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; `debug = true` in the config raises the level later
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, filter_handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    info!("dib v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = config::load(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Please ensure {} exists and is properly formatted.", config_path);
        e
    })?;

    if config.debug {
        if let Err(e) = filter_handle.reload(EnvFilter::new("debug")) {
            warn!("Failed to enable debug logging: {}", e);
        }
    }

    info!("Configuration loaded successfully");
    info!("  Guild: {}", config.discord.guild_id);
    info!("  IRC server: {} (tls: {})", config.irc.server, config.irc.use_tls);
    info!("  Listener: {}", config.irc.listener_name);
    info!("  Channel pairs: {}", config.channel_mappings.len());

    let mut bridge = Bridge::new(config).map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    if let Err(e) = bridge.open().await {
        if e.is_permission_denied() {
            error!("The bot does not have the 'Manage Webhooks' permission.");
            error!("Grant it in the guild's role settings and restart the bridge.");
        } else {
            error!("Failed to open bridge: {}", e);
        }
        std::process::exit(1);
    }

    shutdown_signal().await;
    info!("Shutdown signal received - closing bridge...");
    bridge.close().await;

    info!("Exiting...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
