//! Common utilities and types shared across the application.

pub mod error;
pub mod messages;
pub mod text;

pub use messages::{
    DiscordCommand, DiscordEvent, DiscordMessageEvent, IrcCommand, IrcEvent, IrcMessageEvent,
    UserUpdateEvent,
};
