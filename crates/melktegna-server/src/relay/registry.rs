//! Connection registry: which live connection speaks for which user.
//!
//! Holds at most one handle per user. Binding is last-writer-wins: a second
//! announcement from the same user replaces the first handle without
//! closing the old connection. Entries are removed when their connection
//! closes, so a resolved handle is either live or about to be cleaned up by
//! the router.

use melktegna_core::{ConnectionId, Envelope, UserId};
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Sending half of one connection's outbound queue.
///
/// Cloning is cheap. The handle stops accepting events the moment the
/// connection task drops its receiver.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Envelope>,
}

/// Why an event could not be queued on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The connection is gone.
    Closed,
    /// The connection's outbound queue is full.
    Full,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Envelope>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue an event without waiting.
    pub fn try_deliver(&self, envelope: Envelope) -> Result<(), DeliveryError> {
        match self.tx.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DeliveryError::Full),
            Err(TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }
}

/// In-memory map of `UserId` → live connection.
///
/// All access goes through one lock, so binds, lookups and removals from
/// concurrent connection tasks never interleave inside an operation.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<UserId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user` to `handle`, replacing any previous binding.
    ///
    /// Returns the id of the replaced connection when it was a different
    /// one. That connection is orphaned, not closed.
    pub async fn bind(&self, user: UserId, handle: ConnectionHandle) -> Option<ConnectionId> {
        let conn = handle.id();
        let previous = self.entries.write().await.insert(user.clone(), handle);
        let replaced = previous
            .map(|prev| prev.id())
            .filter(|prev| *prev != conn);

        match replaced {
            Some(prev) => info!(user = %user, conn = %conn, previous = %prev, "user rebound"),
            None => debug!(user = %user, conn = %conn, "user bound"),
        }
        replaced
    }

    /// Current handle for `user`, if any.
    pub async fn resolve(&self, user: &UserId) -> Option<ConnectionHandle> {
        self.entries
            .read()
            .await
            .get(user)
            .cloned()
    }

    /// Remove the binding for `user`. No-op if absent.
    pub async fn unbind(&self, user: &UserId) -> bool {
        let removed = self.entries.write().await.remove(user).is_some();
        if removed {
            debug!(user = %user, "user unbound");
        }
        removed
    }

    /// Remove the binding for `user` only if it still points at `conn`.
    ///
    /// Used when a send finds a dead handle: a newer binding made in the
    /// meantime must survive.
    pub async fn unbind_if(&self, user: &UserId, conn: ConnectionId) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(user) {
            Some(bound) if bound.id() == conn => {
                entries.remove(user);
                debug!(user = %user, conn = %conn, "stale binding removed");
                true
            }
            _ => false,
        }
    }

    /// Remove every binding held by `conn`. Returns the users released.
    pub async fn release(&self, conn: ConnectionId) -> Vec<UserId> {
        let mut entries = self.entries.write().await;
        let mut released = Vec::new();
        entries.retain(|user, bound| {
            if bound.id() == conn {
                released.push(user.clone());
                false
            } else {
                true
            }
        });
        released
    }

    /// Users currently bound, with their connection ids.
    pub async fn online(&self) -> Vec<(UserId, ConnectionId)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(user, bound)| (user.clone(), bound.id()))
            .collect()
    }

    /// Number of bound users.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}
