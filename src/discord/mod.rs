//! Discord side of the bridge.
//!
//! `normalize` holds the event rules, `handler` feeds it from serenity's
//! gateway callbacks and `client` owns the connection and outbound posting.

pub mod client;
pub mod handler;
pub mod normalize;

pub use client::DiscordAdapter;
