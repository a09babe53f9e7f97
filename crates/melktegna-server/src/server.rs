//! Core server: accepts WebSocket connections and runs one session loop per
//! connection.
//!
//! Owns the connection registry and the three relay handlers built on it
//! (presence, router, disconnect), plus the optional message store.

use crate::config::ServerConfig;
use crate::relay::{
    ConnectionHandle, ConnectionRegistry, ConnectionState, DisconnectHandler, MessageRouter,
    PresenceBinder,
};
use crate::store::{MemoryStore, MessageStore};
use crate::transport::websocket::{self, Inbound, Listener, WebSocketConnection};
use melktegna_core::messages::{error_code, DeleteMessagePayload, HistoryRequestPayload};
use melktegna_core::{
    json_decode, ChatResult, ConnectionId, Envelope, FrameDecoder, MsgType, Payload,
    RoutedMessage, UserId, WireFormat,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// How long shutdown waits for sessions to deliver their notice and close.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Per-connection context threaded through the session loop.
struct ConnectionContext {
    id: ConnectionId,
    remote: SocketAddr,
    /// Handle other connections use to push events to this one.
    handle: ConnectionHandle,
    /// Encoding of the most recent inbound message.
    format: WireFormat,
    state: ConnectionState,
    decoder: FrameDecoder,
}

/// The relay server instance.
pub struct ChatServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    presence: PresenceBinder,
    router: MessageRouter,
    disconnect: DisconnectHandler,
    store: Option<Arc<dyn MessageStore>>,
    next_conn_id: AtomicU64,
    /// Broadcast sender for server shutdown notification.
    shutdown_tx: broadcast::Sender<()>,
}

/// A server running in the background.
pub struct ServerHandle {
    local_addr: SocketAddr,
    server: Arc<ChatServer>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener is bound to (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// WebSocket URL for this server.
    pub fn url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Shared handle to the live registry; stays usable after shutdown.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.server.registry.clone()
    }

    /// Notify connected clients, stop accepting, and wait for open
    /// sessions to close (bounded by a grace period).
    pub async fn shutdown(self) {
        let _ = self.server.shutdown_tx.send(());
        let _ = self.task.await;
    }
}

impl ChatServer {
    /// Create a new server. A [`MemoryStore`] is attached when history is
    /// enabled in `config`.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let store: Option<Arc<dyn MessageStore>> = if config.history_enabled {
            Some(Arc::new(MemoryStore::new(config.history_max_messages)))
        } else {
            None
        };

        Self {
            presence: PresenceBinder::new(registry.clone()),
            router: MessageRouter::new(registry.clone()),
            disconnect: DisconnectHandler::new(registry.clone()),
            registry,
            store,
            config,
            next_conn_id: AtomicU64::new(1),
            shutdown_tx: broadcast::channel(1).0,
        }
    }

    /// Replace the message store.
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Bind the listener and serve in a background task.
    pub async fn spawn(self) -> ChatResult<ServerHandle> {
        let listener = websocket::start_listener(self.config.listen_addr()).await?;
        let local_addr = listener.local_addr;
        let server = Arc::new(self);

        info!(
            addr = %local_addr,
            history = server.store.is_some(),
            outbound_queue = server.config.outbound_queue,
            "melktegna relay ready"
        );

        let task = tokio::spawn(server.clone().accept_loop(listener));
        Ok(ServerHandle {
            local_addr,
            server,
            task,
        })
    }

    async fn accept_loop(self: Arc<Self>, mut listener: Listener) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("shutdown requested, no longer accepting connections");
                    break;
                }
                Some(ws_conn) = listener.incoming.recv() => {
                    let srv = self.clone();
                    sessions.spawn(async move {
                        if let Err(e) = srv.handle_websocket(ws_conn).await {
                            warn!(error = %e, "WebSocket connection error");
                        }
                    });
                }
                // Reap finished sessions so the set does not grow unbounded.
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
                else => {
                    info!("listener closed, shutting down");
                    break;
                }
            }
        }
        drop(listener);

        let open = sessions.len();
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(open = sessions.len(), "sessions still open after grace period, aborting");
            sessions.abort_all();
        } else if open > 0 {
            debug!(open, "all sessions closed");
        }
    }

    /// Drive one connection from accept to close.
    async fn handle_websocket(&self, mut conn: WebSocketConnection) -> ChatResult<()> {
        let id = ConnectionId::new(self.next_conn_id.fetch_add(1, Ordering::Relaxed));
        let (peer_tx, peer_rx) = mpsc::channel::<Envelope>(self.config.outbound_queue);
        let mut ctx = ConnectionContext {
            id,
            remote: conn.remote_addr,
            handle: ConnectionHandle::new(id, peer_tx),
            format: WireFormat::default(),
            state: ConnectionState::Connecting,
            decoder: FrameDecoder::new(),
        };
        info!(conn = %id, remote = %ctx.remote, "client connected");

        let result = self.session_loop(&mut conn, &mut ctx, peer_rx).await;

        // Every exit path, clean or not, must release the bindings.
        self.disconnect.on_close(ctx.id, &mut ctx.state).await;
        result
    }

    /// Post-accept message loop.
    async fn session_loop(
        &self,
        conn: &mut WebSocketConnection,
        ctx: &mut ConnectionContext,
        mut peer_rx: mpsc::Receiver<Envelope>,
    ) -> ChatResult<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!(conn = %ctx.id, "shutdown signal received, notifying client");
                    let notice = Envelope::error(error_code::SHUTTING_DOWN, "server shutting down");
                    let _ = websocket::ws_send_envelope(&mut conn.ws_stream, &notice, ctx.format).await;
                    websocket::ws_close(&mut conn.ws_stream).await;
                    break;
                }

                // Events routed to this connection by other sessions.
                Some(envelope) = peer_rx.recv() => {
                    websocket::ws_send_envelope(&mut conn.ws_stream, &envelope, ctx.format).await?;
                }

                ws_result = websocket::ws_recv(&mut conn.ws_stream) => {
                    match ws_result {
                        Ok(Some(inbound)) => {
                            for reply in self.handle_inbound(inbound, ctx).await {
                                websocket::ws_send_envelope(&mut conn.ws_stream, &reply, ctx.format).await?;
                            }
                        }
                        Ok(None) => {
                            debug!(conn = %ctx.id, "WebSocket session ended (peer closed)");
                            break;
                        }
                        Err(e) => {
                            debug!(conn = %ctx.id, error = %e, "WebSocket session ended");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Decode one transport message and dispatch every event in it.
    ///
    /// Undecodable events are logged and dropped; they never produce a
    /// reply.
    async fn handle_inbound(&self, inbound: Inbound, ctx: &mut ConnectionContext) -> Vec<Envelope> {
        let envelopes = match inbound {
            Inbound::Text(text) => {
                ctx.format = WireFormat::Json;
                match json_decode::<Envelope>(&text) {
                    Ok(envelope) => vec![envelope],
                    Err(e) => {
                        warn!(conn = %ctx.id, error = %e, "malformed JSON event dropped");
                        Vec::new()
                    }
                }
            }
            Inbound::Binary(data) => {
                ctx.format = WireFormat::Cbor;
                match ctx.decoder.feed::<Envelope>(&data) {
                    Ok(decoded) => {
                        for e in &decoded.errors {
                            warn!(conn = %ctx.id, error = %e, "malformed CBOR event dropped");
                        }
                        decoded.messages
                    }
                    Err(e) => {
                        warn!(conn = %ctx.id, error = %e, "CBOR stream reset");
                        Vec::new()
                    }
                }
            }
        };

        let mut replies = Vec::new();
        for envelope in envelopes {
            if let Some(reply) = self.dispatch_message(envelope, ctx).await {
                replies.push(reply);
            }
        }
        replies
    }

    /// Dispatch a single decoded event to the appropriate handler.
    async fn dispatch_message(
        &self,
        envelope: Envelope,
        ctx: &mut ConnectionContext,
    ) -> Option<Envelope> {
        match (&envelope.msg_type, &envelope.payload) {
            (MsgType::AnnouncePresence, Payload::Announce(p)) => {
                match UserId::parse(p.user_id.as_str()) {
                    Ok(user) => {
                        self.presence.announce(user.clone(), ctx.handle.clone()).await;
                        ctx.state.bind(user);
                    }
                    Err(e) => {
                        warn!(conn = %ctx.id, error = %e, "announcement dropped");
                    }
                }
                None
            }
            (MsgType::SendMessage, Payload::Send(p)) => {
                let msg = match RoutedMessage::try_from(p) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(conn = %ctx.id, error = %e, "send dropped");
                        return None;
                    }
                };
                if let Some(store) = &self.store {
                    if let Err(e) = store.persist(&msg).await {
                        warn!(from = %msg.from, to = %msg.to, error = %e, "failed to persist message");
                    }
                }
                let outcome = self.router.route(msg).await;
                debug!(conn = %ctx.id, outcome = ?outcome, "send routed");
                None
            }
            (MsgType::HistoryRequest, Payload::HistoryRequest(p)) => {
                Some(self.history(p, ctx.id).await)
            }
            (MsgType::DeleteMessage, Payload::Delete(p)) => Some(self.delete(p, ctx.id).await),
            (MsgType::Ping, Payload::PingPong(p)) => Some(Envelope::pong(p.id)),
            (MsgType::Pong, _) => None,
            (msg_type, _) => {
                warn!(conn = %ctx.id, msg_type = ?msg_type, "unexpected or malformed event dropped");
                None
            }
        }
    }

    async fn history(&self, req: &HistoryRequestPayload, conn: ConnectionId) -> Envelope {
        let (user, peer) = match (UserId::parse(req.user.as_str()), UserId::parse(req.peer.as_str())) {
            (Ok(user), Ok(peer)) => (user, peer),
            (Err(e), _) | (_, Err(e)) => {
                return Envelope::error(error_code::BAD_REQUEST, e.to_string());
            }
        };
        let Some(store) = &self.store else {
            return Envelope::error(error_code::HISTORY_UNAVAILABLE, "history is not enabled");
        };

        match store.fetch_history(&user, &peer, req.limit).await {
            Ok(messages) => {
                debug!(conn = %conn, user = %user, peer = %peer, count = messages.len(), "history served");
                Envelope::history(messages.iter().map(|m| m.to_entry(&user)).collect())
            }
            Err(e) => {
                warn!(conn = %conn, user = %user, peer = %peer, error = %e, "history fetch failed");
                Envelope::error(error_code::STORE_FAILURE, "history unavailable")
            }
        }
    }

    async fn delete(&self, req: &DeleteMessagePayload, conn: ConnectionId) -> Envelope {
        let user = match UserId::parse(req.user.as_str()) {
            Ok(user) => user,
            Err(e) => return Envelope::error(error_code::BAD_REQUEST, e.to_string()),
        };
        let Some(store) = &self.store else {
            return Envelope::error(error_code::HISTORY_UNAVAILABLE, "history is not enabled");
        };

        match store.delete(req.message_id, &user).await {
            Ok(true) => {
                info!(conn = %conn, user = %user, id = req.message_id, "message deleted");
                Envelope::message_deleted(req.message_id)
            }
            Ok(false) => Envelope::error(
                error_code::NOT_FOUND,
                format!("no message {} sent by {user}", req.message_id),
            ),
            Err(e) => {
                warn!(conn = %conn, user = %user, error = %e, "delete failed");
                Envelope::error(error_code::STORE_FAILURE, "delete failed")
            }
        }
    }
}
