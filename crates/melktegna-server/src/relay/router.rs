//! Message router: forwards a chat message to the recipient's live
//! connection, if there is one.
//!
//! Delivery is best-effort and at-most-once. Nothing is reported back to
//! the sender; offline recipients catch up from the message store.

use super::registry::{ConnectionRegistry, DeliveryError};
use melktegna_core::{ConnectionId, Envelope, RoutedMessage};
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to one routed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Queued on the recipient's connection.
    Delivered(ConnectionId),
    /// Recipient has no live connection.
    Offline,
    /// Recipient's connection had closed; its binding was removed.
    Stale(ConnectionId),
    /// Recipient's outbound queue was full; the message was not queued.
    Dropped(ConnectionId),
}

impl RouteOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, RouteOutcome::Delivered(_))
    }
}

/// Handles `send-message` events.
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
}

impl MessageRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Route one message.
    ///
    /// Never waits on the recipient: the event is pushed onto its outbound
    /// queue or dropped. Messages routed one after another for the same
    /// recipient are queued in that order.
    pub async fn route(&self, msg: RoutedMessage) -> RouteOutcome {
        let Some(handle) = self.registry.resolve(&msg.to).await else {
            debug!(from = %msg.from, to = %msg.to, "recipient offline, not relayed");
            return RouteOutcome::Offline;
        };

        let conn = handle.id();
        match handle.try_deliver(Envelope::deliver(&msg.from, msg.payload)) {
            Ok(()) => {
                debug!(from = %msg.from, to = %msg.to, conn = %conn, "message relayed");
                RouteOutcome::Delivered(conn)
            }
            Err(DeliveryError::Closed) => {
                self.registry.unbind_if(&msg.to, conn).await;
                debug!(from = %msg.from, to = %msg.to, conn = %conn, "recipient connection gone");
                RouteOutcome::Stale(conn)
            }
            Err(DeliveryError::Full) => {
                warn!(from = %msg.from, to = %msg.to, conn = %conn, "recipient queue full, message dropped");
                RouteOutcome::Dropped(conn)
            }
        }
    }
}
