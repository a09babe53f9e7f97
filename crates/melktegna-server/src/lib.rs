//! melktegna-server: real-time presence and message relay.
//!
//! Clients connect over WebSocket, announce which user they are, and send
//! chat messages addressed to other users. The relay forwards each message
//! to the recipient's live connection when there is one and drops it
//! otherwise; conversation history lives in a [`store::MessageStore`].

pub mod config;
pub mod relay;
pub mod server;
pub mod store;
pub mod transport;

pub use config::{ConfigOverrides, ServerConfig};
pub use server::{ChatServer, ServerHandle};
