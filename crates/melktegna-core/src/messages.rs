//! Wire events exchanged between chat clients and the relay.
//!
//! Every event is an [`Envelope`]: a `type` tag plus the flattened fields
//! of its payload. The same shape is used for CBOR (binary frames) and
//! JSON (text frames).

use crate::error::{ChatError, ChatResult};
use crate::ids::UserId;
use serde::{Deserialize, Serialize};

/// Event type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MsgType {
    /// client → server: "I am online as user X".
    AnnouncePresence,
    /// client → server: relay a chat message.
    SendMessage,
    /// server → recipient: a relayed chat message.
    DeliverMessage,
    /// client → server: fetch stored conversation history.
    HistoryRequest,
    /// server → client: stored conversation history.
    History,
    /// client → server: remove one stored message the user sent.
    DeleteMessage,
    /// server → client: the message was removed.
    MessageDeleted,
    Ping,
    Pong,
    Error,
}

/// Envelope: every event has a `type` plus a payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub msg_type: MsgType,

    #[serde(flatten)]
    pub payload: Payload,
}

/// All possible payloads (untagged; the envelope's `type` disambiguates).
///
/// Variant order matters for decoding: payloads with more required fields
/// come first so a complete `send-message` never decodes as a delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Send(SendMessagePayload),
    Deliver(DeliverMessagePayload),
    HistoryRequest(HistoryRequestPayload),
    Delete(DeleteMessagePayload),
    History(HistoryPayload),
    Announce(AnnouncePayload),
    Error(ErrorPayload),
    Deleted(MessageDeletedPayload),
    PingPong(PingPongPayload),
    Empty(EmptyPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmptyPayload {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingPongPayload {
    pub id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnouncePayload {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessagePayload {
    pub to: String,
    pub from: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverMessagePayload {
    pub from: String,
    pub payload: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRequestPayload {
    pub user: String,
    pub peer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteMessagePayload {
    /// Who is asking; only the sender of a message may delete it.
    pub user: String,
    pub message_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDeletedPayload {
    pub message_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPayload {
    pub messages: Vec<HistoryEntry>,
}

/// One stored message as seen by the requesting user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    /// Whether the requesting user sent this message.
    pub from_self: bool,
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub sent_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: u32,
    pub message: String,
}

/// Codes carried by `error` events.
pub mod error_code {
    /// The request was well-formed on the wire but carried invalid fields.
    pub const BAD_REQUEST: u32 = 400;
    /// No stored message with that id was sent by the requester.
    pub const NOT_FOUND: u32 = 404;
    /// The store failed while serving a request.
    pub const STORE_FAILURE: u32 = 500;
    /// No message store is configured on this server.
    pub const HISTORY_UNAVAILABLE: u32 = 501;
    /// The server is shutting down; reconnect later.
    pub const SHUTTING_DOWN: u32 = 503;
}

// ── Constructors ──────────────────────────────────────────────────────

impl Envelope {
    pub fn announce(user: &UserId) -> Self {
        Self {
            msg_type: MsgType::AnnouncePresence,
            payload: Payload::Announce(AnnouncePayload {
                user_id: user.to_string(),
            }),
        }
    }

    pub fn send(msg: &RoutedMessage) -> Self {
        Self {
            msg_type: MsgType::SendMessage,
            payload: Payload::Send(SendMessagePayload {
                to: msg.to.to_string(),
                from: msg.from.to_string(),
                payload: msg.payload.clone(),
            }),
        }
    }

    pub fn deliver(from: &UserId, payload: impl Into<String>) -> Self {
        Self {
            msg_type: MsgType::DeliverMessage,
            payload: Payload::Deliver(DeliverMessagePayload {
                from: from.to_string(),
                payload: payload.into(),
            }),
        }
    }

    pub fn history_request(user: &UserId, peer: &UserId, limit: Option<usize>) -> Self {
        Self {
            msg_type: MsgType::HistoryRequest,
            payload: Payload::HistoryRequest(HistoryRequestPayload {
                user: user.to_string(),
                peer: peer.to_string(),
                limit,
            }),
        }
    }

    pub fn history(messages: Vec<HistoryEntry>) -> Self {
        Self {
            msg_type: MsgType::History,
            payload: Payload::History(HistoryPayload { messages }),
        }
    }

    pub fn delete_message(user: &UserId, message_id: u64) -> Self {
        Self {
            msg_type: MsgType::DeleteMessage,
            payload: Payload::Delete(DeleteMessagePayload {
                user: user.to_string(),
                message_id,
            }),
        }
    }

    pub fn message_deleted(message_id: u64) -> Self {
        Self {
            msg_type: MsgType::MessageDeleted,
            payload: Payload::Deleted(MessageDeletedPayload { message_id }),
        }
    }

    pub fn ping(id: u64) -> Self {
        Self {
            msg_type: MsgType::Ping,
            payload: Payload::PingPong(PingPongPayload { id }),
        }
    }

    pub fn pong(id: u64) -> Self {
        Self {
            msg_type: MsgType::Pong,
            payload: Payload::PingPong(PingPongPayload { id }),
        }
    }

    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self {
            msg_type: MsgType::Error,
            payload: Payload::Error(ErrorPayload {
                code,
                message: message.into(),
            }),
        }
    }
}

// ── Validated forms ───────────────────────────────────────────────────

/// A validated chat message in flight from sender to recipient.
///
/// Transient: it exists only between the router and the recipient's
/// connection and is never stored by the relay itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedMessage {
    pub to: UserId,
    pub from: UserId,
    pub payload: String,
}

impl RoutedMessage {
    pub fn new(from: UserId, to: UserId, payload: impl Into<String>) -> Self {
        Self {
            to,
            from,
            payload: payload.into(),
        }
    }
}

impl TryFrom<&SendMessagePayload> for RoutedMessage {
    type Error = ChatError;

    fn try_from(p: &SendMessagePayload) -> ChatResult<Self> {
        let to = UserId::parse(p.to.as_str())
            .map_err(|e| ChatError::InvalidMessage(format!("bad `to`: {e}")))?;
        let from = UserId::parse(p.from.as_str())
            .map_err(|e| ChatError::InvalidMessage(format!("bad `from`: {e}")))?;
        Ok(Self {
            to,
            from,
            payload: p.payload.clone(),
        })
    }
}
