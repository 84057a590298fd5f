pub mod client;
pub mod codec;
pub mod message;

pub use client::{IrcAdapter, IrcSettings};
