//! Presence binder: turns an "online as user X" announcement into a binding.

use super::registry::{ConnectionHandle, ConnectionRegistry};
use melktegna_core::{ConnectionId, UserId};
use std::sync::Arc;
use tracing::info;

/// Handles `announce-presence` events.
///
/// The announced id is taken at face value; whoever issued the client's
/// credentials is responsible for it.
pub struct PresenceBinder {
    registry: Arc<ConnectionRegistry>,
}

impl PresenceBinder {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Bind `user` to the announcing connection.
    ///
    /// Returns the connection the user was previously bound to, if the
    /// announcement displaced one.
    pub async fn announce(&self, user: UserId, handle: ConnectionHandle) -> Option<ConnectionId> {
        let conn = handle.id();
        let displaced = self.registry.bind(user.clone(), handle).await;
        info!(user = %user, conn = %conn, "presence announced");
        displaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::registry::tests::{handle, uid};

    #[tokio::test]
    async fn announce_binds_user() {
        let registry = Arc::new(ConnectionRegistry::new());
        let binder = PresenceBinder::new(registry.clone());
        let (h, _rx) = handle(5, 4);

        assert_eq!(binder.announce(uid("alice"), h).await, None);
        assert_eq!(
            registry.resolve(&uid("alice")).await.unwrap().id(),
            ConnectionId::new(5)
        );
    }

    #[tokio::test]
    async fn reannounce_from_new_connection_replaces_binding() {
        let registry = Arc::new(ConnectionRegistry::new());
        let binder = PresenceBinder::new(registry.clone());
        let (a, _rx_a) = handle(1, 4);
        let (b, _rx_b) = handle(2, 4);

        binder.announce(uid("alice"), a).await;
        let displaced = binder.announce(uid("alice"), b).await;

        assert_eq!(displaced, Some(ConnectionId::new(1)));
        assert_eq!(
            registry.resolve(&uid("alice")).await.unwrap().id(),
            ConnectionId::new(2)
        );
    }
}
