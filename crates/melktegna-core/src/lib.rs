//! melktegna-core: Shared protocol library for the Melktegna chat relay.
//!
//! Provides the wire event types, user/connection identifiers, the
//! CBOR and JSON codecs, and the common error type used by the server,
//! client and CLI crates.

pub mod codec;
pub mod error;
pub mod ids;
pub mod messages;

// Re-export commonly used items at crate root.
pub use codec::{cbor_decode, frame_encode, json_decode, json_encode, Decoded, FrameDecoder, WireFormat};
pub use error::{ChatError, ChatResult};
pub use ids::{ConnectionId, UserId};
pub use messages::{Envelope, MsgType, Payload, RoutedMessage};
