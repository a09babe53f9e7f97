//! In-process message store.

use super::{MessageStore, StoreFuture, StoredMessage};
use melktegna_core::{RoutedMessage, UserId};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::debug;

/// Bounded in-memory history. Oldest messages are evicted first.
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    max_messages: usize,
}

#[derive(Debug, Default)]
struct Inner {
    messages: VecDeque<StoredMessage>,
    next_id: u64,
}

impl MemoryStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                messages: VecDeque::new(),
                next_id: 1,
            }),
            max_messages: max_messages.max(1),
        }
    }

    /// Total messages currently held.
    pub async fn len(&self) -> usize {
        self.inner.read().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl MessageStore for MemoryStore {
    fn persist<'a>(&'a self, msg: &'a RoutedMessage) -> StoreFuture<'a, StoredMessage> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            let stored = StoredMessage {
                id: inner.next_id,
                from: msg.from.clone(),
                to: msg.to.clone(),
                text: msg.payload.clone(),
                sent_at: now_millis(),
            };
            inner.next_id += 1;
            inner.messages.push_back(stored.clone());

            while inner.messages.len() > self.max_messages {
                if let Some(evicted) = inner.messages.pop_front() {
                    debug!(id = evicted.id, "history full, evicted oldest message");
                }
            }
            Ok(stored)
        })
    }

    fn fetch_history<'a>(
        &'a self,
        user: &'a UserId,
        peer: &'a UserId,
        limit: Option<usize>,
    ) -> StoreFuture<'a, Vec<StoredMessage>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            let mut found: Vec<StoredMessage> = inner
                .messages
                .iter()
                .filter(|m| m.is_between(user, peer))
                .cloned()
                .collect();
            if let Some(limit) = limit {
                let skip = found.len().saturating_sub(limit);
                found.drain(..skip);
            }
            Ok(found)
        })
    }

    fn delete<'a>(&'a self, id: u64, sender: &'a UserId) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            let Some(pos) = inner
                .messages
                .iter()
                .position(|m| m.id == id && &m.from == sender)
            else {
                return Ok(false);
            };
            inner.messages.remove(pos);
            debug!(id, sender = %sender, "message deleted");
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn msg(from: &str, to: &str, text: &str) -> RoutedMessage {
        RoutedMessage::new(uid(from), uid(to), text)
    }

    #[tokio::test]
    async fn history_covers_both_directions_in_order() {
        let store = MemoryStore::new(100);
        store.persist(&msg("alice", "bob", "hi")).await.unwrap();
        store.persist(&msg("carol", "bob", "unrelated")).await.unwrap();
        store.persist(&msg("bob", "alice", "hey")).await.unwrap();

        let history = store
            .fetch_history(&uid("alice"), &uid("bob"), None)
            .await
            .unwrap();
        let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["hi", "hey"]);
        assert!(history[0].id < history[1].id);

        let entries: Vec<bool> = history
            .iter()
            .map(|m| m.to_entry(&uid("bob")).from_self)
            .collect();
        assert_eq!(entries, [false, true]);
    }

    #[tokio::test]
    async fn limit_keeps_most_recent() {
        let store = MemoryStore::new(100);
        for i in 0..5 {
            store
                .persist(&msg("alice", "bob", &format!("m{i}")))
                .await
                .unwrap();
        }
        let history = store
            .fetch_history(&uid("bob"), &uid("alice"), Some(2))
            .await
            .unwrap();
        let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["m3", "m4"]);
    }

    #[tokio::test]
    async fn evicts_oldest_beyond_capacity() {
        let store = MemoryStore::new(2);
        for text in ["a", "b", "c"] {
            store.persist(&msg("alice", "bob", text)).await.unwrap();
        }
        assert_eq!(store.len().await, 2);
        let history = store
            .fetch_history(&uid("alice"), &uid("bob"), None)
            .await
            .unwrap();
        assert_eq!(history[0].text, "b");
        assert_eq!(history[0].id, 2);
    }

    #[tokio::test]
    async fn only_the_sender_can_delete() {
        let store = MemoryStore::new(10);
        let hi = store.persist(&msg("alice", "bob", "hi")).await.unwrap();
        store.persist(&msg("bob", "alice", "hey")).await.unwrap();

        assert!(!store.delete(hi.id, &uid("bob")).await.unwrap());
        assert!(store.delete(hi.id, &uid("alice")).await.unwrap());
        assert!(!store.delete(hi.id, &uid("alice")).await.unwrap());

        let history = store
            .fetch_history(&uid("alice"), &uid("bob"), None)
            .await
            .unwrap();
        let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["hey"]);
    }

    #[tokio::test]
    async fn empty_conversation() {
        let store = MemoryStore::new(10);
        assert!(store.is_empty().await);
        assert!(store
            .fetch_history(&uid("alice"), &uid("bob"), Some(10))
            .await
            .unwrap()
            .is_empty());
    }
}
