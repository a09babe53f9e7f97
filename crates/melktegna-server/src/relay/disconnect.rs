//! Disconnect handling and the per-connection lifecycle.

use super::registry::ConnectionRegistry;
use melktegna_core::{ConnectionId, UserId};
use std::sync::Arc;
use tracing::{debug, info};

/// Lifecycle of one client connection.
///
/// `Connecting → Bound → Closed`, with `Connecting → Closed` for clients
/// that never announce. `Closed` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Connecting,
    /// Announced at least once; holds every id this connection announced.
    Bound(Vec<UserId>),
    Closed,
}

impl ConnectionState {
    /// Record an announcement. Ignored once closed.
    pub fn bind(&mut self, user: UserId) {
        match self {
            ConnectionState::Connecting => *self = ConnectionState::Bound(vec![user]),
            ConnectionState::Bound(users) => {
                if !users.contains(&user) {
                    users.push(user);
                }
            }
            ConnectionState::Closed => {}
        }
    }

    /// Move to `Closed`, returning whether the connection had been bound.
    pub fn close(&mut self) -> bool {
        let was_bound = matches!(self, ConnectionState::Bound(_));
        *self = ConnectionState::Closed;
        was_bound
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

/// Removes a closing connection's bindings from the registry.
pub struct DisconnectHandler {
    registry: Arc<ConnectionRegistry>,
}

impl DisconnectHandler {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Close `state` and release every binding held by `conn`.
    ///
    /// Bindings the same users made from newer connections are untouched.
    pub async fn on_close(&self, conn: ConnectionId, state: &mut ConnectionState) -> Vec<UserId> {
        if state.is_closed() {
            return Vec::new();
        }
        let was_bound = state.close();
        let released = self.registry.release(conn).await;

        if released.is_empty() {
            debug!(conn = %conn, was_bound, "connection closed");
        } else {
            let users: Vec<&str> = released.iter().map(UserId::as_str).collect();
            info!(conn = %conn, users = ?users, "connection closed, presence released");
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::registry::tests::{handle, uid};

    #[test]
    fn state_machine_transitions() {
        let mut state = ConnectionState::default();
        assert_eq!(state, ConnectionState::Connecting);

        state.bind(uid("alice"));
        state.bind(uid("alice"));
        assert_eq!(state, ConnectionState::Bound(vec![uid("alice")]));

        assert!(state.close());
        assert!(state.is_closed());

        state.bind(uid("bob"));
        assert!(state.is_closed());
        assert!(!state.close());
    }

    #[tokio::test]
    async fn close_releases_bindings() {
        let registry = Arc::new(ConnectionRegistry::new());
        let handler = DisconnectHandler::new(registry.clone());
        let (h, _rx) = handle(3, 4);
        registry.bind(uid("bob"), h).await;

        let mut state = ConnectionState::Connecting;
        state.bind(uid("bob"));
        let released = handler.on_close(ConnectionId::new(3), &mut state).await;

        assert_eq!(released, vec![uid("bob")]);
        assert!(registry.resolve(&uid("bob")).await.is_none());
        assert!(state.is_closed());
    }

    #[tokio::test]
    async fn close_of_superseded_connection_keeps_newer_binding() {
        let registry = Arc::new(ConnectionRegistry::new());
        let handler = DisconnectHandler::new(registry.clone());
        let (a, _rx_a) = handle(1, 4);
        let (b, _rx_b) = handle(2, 4);
        registry.bind(uid("bob"), a).await;
        registry.bind(uid("bob"), b).await;

        let mut state_a = ConnectionState::Bound(vec![uid("bob")]);
        let released = handler.on_close(ConnectionId::new(1), &mut state_a).await;

        assert!(released.is_empty());
        assert_eq!(
            registry.resolve(&uid("bob")).await.unwrap().id(),
            ConnectionId::new(2)
        );
    }

    #[tokio::test]
    async fn closing_twice_is_harmless() {
        let registry = Arc::new(ConnectionRegistry::new());
        let handler = DisconnectHandler::new(registry);
        let mut state = ConnectionState::Connecting;

        assert!(handler.on_close(ConnectionId::new(9), &mut state).await.is_empty());
        assert!(handler.on_close(ConnectionId::new(9), &mut state).await.is_empty());
    }
}
