//! The routing hub between the Discord and IRC adapters.
//!
//! ## Module Structure
//!
//! - `channels`: Communication channel structures
//! - `mapping`: Discord channel <-> IRC channel association
//! - `presence`: Last known presence per Discord user
//! - `webhooks`: Relay webhook discovery
//! - `router`: Event routing and the close handshake
//! - `orchestrator`: Bridge lifecycle (`Bridge` struct)

pub mod channels;
pub mod mapping;
pub mod orchestrator;
pub mod presence;
pub mod router;
pub mod webhooks;

pub use orchestrator::Bridge;
