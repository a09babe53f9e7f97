//! High-level chat client.
//!
//! Wraps a [`WebSocketSession`] with the chat operations: announce, send,
//! history, delete and ping. Inbound envelopes are surfaced as [`ClientEvent`]s.

use std::collections::VecDeque;
use std::time::Duration;

use melktegna_core::messages::HistoryEntry;
use melktegna_core::{ChatError, ChatResult, Envelope, MsgType, Payload, RoutedMessage, UserId, WireFormat};

use crate::transport::WebSocketSession;

/// Something the server pushed to this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A chat message relayed from another user.
    Message { from: String, payload: String },
    /// Reply to [`ChatClient::request_history`].
    History(Vec<HistoryEntry>),
    /// Reply to [`ChatClient::delete_message`].
    Deleted(u64),
    Pong(u64),
    Error { code: u32, message: String },
}

impl ClientEvent {
    fn from_envelope(envelope: Envelope) -> Option<Self> {
        match (envelope.msg_type, envelope.payload) {
            (MsgType::DeliverMessage, Payload::Deliver(p)) => Some(Self::Message {
                from: p.from,
                payload: p.payload,
            }),
            (MsgType::History, Payload::History(p)) => Some(Self::History(p.messages)),
            (MsgType::MessageDeleted, Payload::Deleted(p)) => Some(Self::Deleted(p.message_id)),
            (MsgType::Pong, Payload::PingPong(p)) => Some(Self::Pong(p.id)),
            (MsgType::Error, Payload::Error(p)) => Some(Self::Error {
                code: p.code,
                message: p.message,
            }),
            (msg_type, _) => {
                tracing::debug!(?msg_type, "ignoring unexpected event");
                None
            }
        }
    }
}

/// A connection to the chat relay.
pub struct ChatClient {
    transport: WebSocketSession,
    user: Option<UserId>,
    /// Events read while waiting for something else (see [`Self::sync`]).
    pending: VecDeque<ClientEvent>,
    next_ping_id: u64,
}

impl ChatClient {
    /// Connect using the binary CBOR wire format.
    pub async fn connect(url: &str) -> ChatResult<Self> {
        Self::connect_with(url, WireFormat::Cbor).await
    }

    /// Connect using an explicit wire format.
    pub async fn connect_with(url: &str, format: WireFormat) -> ChatResult<Self> {
        let transport = WebSocketSession::connect(url, format).await?;
        tracing::info!(url, format = format.as_str(), "connected to relay");
        Ok(Self {
            transport,
            user: None,
            pending: VecDeque::new(),
            next_ping_id: 1,
        })
    }

    /// The identity this client acts as, if any.
    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    /// Act as `user` without announcing presence.
    ///
    /// Sends and history requests carry the identity themselves, so a
    /// short-lived connection can use them without taking live delivery
    /// away from the user's announced connection.
    pub fn set_identity(&mut self, user: UserId) {
        self.user = Some(user);
    }

    /// Tell the relay this connection is `user`. Announcing again rebinds.
    pub async fn announce(&mut self, user: &UserId) -> ChatResult<()> {
        self.transport.send(&Envelope::announce(user)).await?;
        self.user = Some(user.clone());
        tracing::debug!(user = %user, "presence announced");
        Ok(())
    }

    /// Send `payload` to `to` as this client's identity.
    pub async fn send_message(&mut self, to: &UserId, payload: impl Into<String>) -> ChatResult<()> {
        let from = self.identity("sending")?.clone();
        let msg = RoutedMessage::new(from, to.clone(), payload);
        self.transport.send(&Envelope::send(&msg)).await
    }

    /// Ask for the stored conversation with `peer`. The reply arrives as
    /// [`ClientEvent::History`] (or an error event).
    pub async fn request_history(&mut self, peer: &UserId, limit: Option<usize>) -> ChatResult<()> {
        let user = self.identity("requesting history")?;
        self.transport
            .send(&Envelope::history_request(user, peer, limit))
            .await
    }

    /// Ask the relay to delete stored message `message_id`. Only messages
    /// this user sent can be deleted; the reply is [`ClientEvent::Deleted`]
    /// or an error event.
    pub async fn delete_message(&mut self, message_id: u64) -> ChatResult<()> {
        let user = self.identity("deleting")?;
        self.transport
            .send(&Envelope::delete_message(user, message_id))
            .await
    }

    fn identity(&self, action: &str) -> ChatResult<&UserId> {
        self.user.as_ref().ok_or_else(|| {
            ChatError::InvalidMessage(format!("set an identity or announce before {action}"))
        })
    }

    /// Send a ping and return its id.
    pub async fn ping(&mut self) -> ChatResult<u64> {
        let id = self.next_ping_id;
        self.next_ping_id += 1;
        self.transport.send(&Envelope::ping(id)).await?;
        Ok(id)
    }

    /// Round-trip a ping. Once the matching pong arrives, everything the
    /// server sent before it has been received; other events stay queued
    /// for [`Self::next_event`].
    pub async fn sync(&mut self, timeout: Duration) -> ChatResult<()> {
        let id = self.ping().await?;
        let mut seen = Vec::new();

        let result = tokio::time::timeout(timeout, async {
            while let Some(envelope) = self.transport.recv().await {
                match ClientEvent::from_envelope(envelope) {
                    Some(ClientEvent::Pong(pong)) if pong == id => return Ok(()),
                    Some(event) => seen.push(event),
                    None => {}
                }
            }
            Err(ChatError::Transport("connection closed".into()))
        })
        .await;

        self.pending.extend(seen);
        result.map_err(|_| ChatError::Timeout)?
    }

    /// Next event, or `None` once the connection has closed.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        while let Some(envelope) = self.transport.recv().await {
            if let Some(event) = ClientEvent::from_envelope(envelope) {
                return Some(event);
            }
        }
        None
    }

    /// Like [`Self::next_event`] but gives up after `timeout`.
    pub async fn next_event_timeout(&mut self, timeout: Duration) -> ChatResult<Option<ClientEvent>> {
        tokio::time::timeout(timeout, self.next_event())
            .await
            .map_err(|_| ChatError::Timeout)
    }

    /// Close the connection.
    pub async fn close(mut self) -> ChatResult<()> {
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_becomes_message_event() {
        let from = UserId::parse("alice").unwrap();
        let event = ClientEvent::from_envelope(Envelope::deliver(&from, "hi"));
        assert_eq!(
            event,
            Some(ClientEvent::Message {
                from: "alice".into(),
                payload: "hi".into()
            })
        );
    }

    #[test]
    fn error_and_pong_events() {
        assert_eq!(
            ClientEvent::from_envelope(Envelope::error(503, "bye")),
            Some(ClientEvent::Error {
                code: 503,
                message: "bye".into()
            })
        );
        assert_eq!(
            ClientEvent::from_envelope(Envelope::pong(4)),
            Some(ClientEvent::Pong(4))
        );
        assert_eq!(
            ClientEvent::from_envelope(Envelope::message_deleted(9)),
            Some(ClientEvent::Deleted(9))
        );
    }

    #[test]
    fn client_bound_requests_are_ignored() {
        let user = UserId::parse("bob").unwrap();
        assert_eq!(ClientEvent::from_envelope(Envelope::announce(&user)), None);
        assert_eq!(ClientEvent::from_envelope(Envelope::ping(1)), None);
    }
}
