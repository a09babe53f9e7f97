//! Durable message history, consumed by the relay as a collaborator.
//!
//! The relay never depends on a store for live delivery. When one is
//! configured, every valid `send-message` is persisted before it is routed
//! so an offline recipient can fetch it later.

pub mod memory;

pub use memory::MemoryStore;

use melktegna_core::messages::HistoryEntry;
use melktegna_core::{ChatResult, RoutedMessage, UserId};
use std::future::Future;
use std::pin::Pin;

/// A message as recorded by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Store-assigned id, increasing in insertion order.
    pub id: u64,
    pub from: UserId,
    pub to: UserId,
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub sent_at: u64,
}

impl StoredMessage {
    /// Project onto the wire form as seen by `viewer`.
    pub fn to_entry(&self, viewer: &UserId) -> HistoryEntry {
        HistoryEntry {
            id: self.id,
            from_self: &self.from == viewer,
            message: self.text.clone(),
            sent_at: self.sent_at,
        }
    }

    /// Whether this message belongs to the conversation between `a` and `b`.
    pub fn is_between(&self, a: &UserId, b: &UserId) -> bool {
        (&self.from == a && &self.to == b) || (&self.from == b && &self.to == a)
    }
}

/// Boxed future returned by [`MessageStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = ChatResult<T>> + Send + 'a>>;

/// Persistence collaborator for chat history.
pub trait MessageStore: Send + Sync {
    /// Record a message regardless of whether it is delivered live.
    fn persist<'a>(&'a self, msg: &'a RoutedMessage) -> StoreFuture<'a, StoredMessage>;

    /// Messages exchanged between `user` and `peer`, oldest first.
    ///
    /// With `limit`, only the most recent `limit` messages are returned.
    fn fetch_history<'a>(
        &'a self,
        user: &'a UserId,
        peer: &'a UserId,
        limit: Option<usize>,
    ) -> StoreFuture<'a, Vec<StoredMessage>>;

    /// Remove message `id` if `sender` sent it. Returns whether a message
    /// was removed.
    fn delete<'a>(&'a self, id: u64, sender: &'a UserId) -> StoreFuture<'a, bool>;
}
