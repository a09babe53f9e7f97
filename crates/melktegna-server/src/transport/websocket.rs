//! WebSocket listener using tokio-tungstenite.
//!
//! Binary messages carry length-prefixed CBOR envelopes; text messages carry
//! one JSON envelope each. Pings are answered here and never reach the
//! relay.

use futures_util::{SinkExt, StreamExt};
use melktegna_core::{frame_encode, json_encode, ChatError, ChatResult, Envelope, WireFormat};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

/// Maximum size of one inbound WebSocket message (1 MiB).
const MAX_WS_MESSAGE_SIZE: usize = 1_048_576;

/// A handle to an accepted WebSocket connection.
pub struct WebSocketConnection {
    pub ws_stream: WebSocketStream<TcpStream>,
    pub remote_addr: SocketAddr,
}

/// A running accept loop. Dropping it stops accepting new connections.
pub struct Listener {
    pub local_addr: SocketAddr,
    pub incoming: mpsc::Receiver<WebSocketConnection>,
    task: JoinHandle<()>,
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// One inbound application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Binary(Vec<u8>),
    Text(String),
}

/// Start the WebSocket listener.
pub async fn start_listener(bind_addr: SocketAddr) -> ChatResult<Listener> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| ChatError::Transport(format!("WS bind failed: {e}")))?;
    let local_addr = tcp_listener.local_addr()?;

    info!(addr = %local_addr, "WebSocket listener started");

    let (tx, incoming) = mpsc::channel::<WebSocketConnection>(64);

    let task = tokio::spawn(async move {
        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        match tokio_tungstenite::accept_async(stream).await {
                            Ok(ws_stream) => {
                                debug!(remote = %addr, "WebSocket connection accepted");
                                let conn = WebSocketConnection {
                                    ws_stream,
                                    remote_addr: addr,
                                };
                                if tx.send(conn).await.is_err() {
                                    warn!("WebSocket connection channel closed");
                                }
                            }
                            Err(e) => {
                                warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
        }
    });

    Ok(Listener {
        local_addr,
        incoming,
        task,
    })
}

/// Encode one envelope in `format` and send it.
pub async fn ws_send_envelope(
    ws: &mut WebSocketStream<TcpStream>,
    envelope: &Envelope,
    format: WireFormat,
) -> ChatResult<()> {
    let message = match format {
        WireFormat::Cbor => Message::Binary(frame_encode(envelope)?.into()),
        WireFormat::Json => Message::Text(json_encode(envelope)?.into()),
    };
    ws.send(message)
        .await
        .map_err(|e| ChatError::Transport(format!("WS send failed: {e}")))
}

/// Send a close frame, ignoring errors from an already-dead peer.
pub async fn ws_close(ws: &mut WebSocketStream<TcpStream>) {
    let _ = ws.close(None).await;
}

/// Receive the next application message.
///
/// Returns `None` once the peer has closed the connection.
pub async fn ws_recv(ws: &mut WebSocketStream<TcpStream>) -> ChatResult<Option<Inbound>> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Binary(data))) => {
                check_size(data.len())?;
                return Ok(Some(Inbound::Binary(data.to_vec())));
            }
            Some(Ok(Message::Text(text))) => {
                check_size(text.len())?;
                return Ok(Some(Inbound::Text(text.to_string())));
            }
            Some(Ok(Message::Close(_))) => return Ok(None),
            Some(Ok(Message::Ping(payload))) => {
                let _ = ws.send(Message::Pong(payload)).await;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                return Err(ChatError::Transport(format!("WS recv failed: {e}")));
            }
            None => return Ok(None),
        }
    }
}

fn check_size(len: usize) -> ChatResult<()> {
    if len > MAX_WS_MESSAGE_SIZE {
        return Err(ChatError::InvalidMessage(format!(
            "WS message too large: {len} bytes (max {MAX_WS_MESSAGE_SIZE})"
        )));
    }
    Ok(())
}
