//! melktegna-client: async client library for the Melktegna chat relay.
//!
//! # Quick Start
//!
//! ```no_run
//! use melktegna_client::ChatClient;
//! use melktegna_core::UserId;
//!
//! # async fn example() -> melktegna_core::ChatResult<()> {
//! let mut client = ChatClient::connect("ws://127.0.0.1:5000").await?;
//! client.announce(&UserId::parse("alice")?).await?;
//! client.send_message(&UserId::parse("bob")?, "hi").await?;
//!
//! while let Some(event) = client.next_event().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod inbox;
pub mod transport;

pub use client::{ChatClient, ClientEvent};
pub use inbox::{quote_reply, Inbox};
pub use transport::WebSocketSession;

pub use melktegna_core::{ChatError, ChatResult, WireFormat};
