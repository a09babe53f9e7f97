//! WebSocket transport for the chat client.
//!
//! Outbound envelopes are written through a shared sink. A background
//! dispatch loop reads the socket, decodes every envelope (CBOR frames in
//! binary messages, JSON in text messages) and forwards it on a channel.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use melktegna_core::{
    frame_encode, json_decode, json_encode, ChatError, ChatResult, Envelope, FrameDecoder,
    WireFormat,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Decoded envelopes buffered between the dispatch loop and the reader.
const INBOUND_QUEUE: usize = 256;

/// A connected WebSocket session.
pub struct WebSocketSession {
    ws_sink: Arc<Mutex<WsSink>>,
    inbound_rx: mpsc::Receiver<Envelope>,
    format: WireFormat,
    dispatch_handle: JoinHandle<()>,
}

impl WebSocketSession {
    /// Connect to a `ws://` or `wss://` URL.
    pub async fn connect(url: &str, format: WireFormat) -> ChatResult<Self> {
        let lower = url.to_lowercase();
        if !(lower.starts_with("ws://") || lower.starts_with("wss://")) {
            return Err(ChatError::Transport(format!(
                "unsupported URL scheme (expected ws:// or wss://): {url}"
            )));
        }

        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| ChatError::Transport(format!("WS connect failed: {e}")))?;
        tracing::debug!(url, format = format.as_str(), "WebSocket connected");

        let (sink, stream) = ws_stream.split();
        let ws_sink = Arc::new(Mutex::new(sink));
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);

        let dispatch_handle = tokio::spawn(Self::dispatch_loop(stream, ws_sink.clone(), inbound_tx));

        Ok(Self {
            ws_sink,
            inbound_rx,
            format,
            dispatch_handle,
        })
    }

    /// Encode and send one envelope in this session's wire format.
    pub async fn send(&self, envelope: &Envelope) -> ChatResult<()> {
        let message = match self.format {
            WireFormat::Cbor => Message::Binary(frame_encode(envelope)?),
            WireFormat::Json => Message::Text(json_encode(envelope)?),
        };
        let mut sink = self.ws_sink.lock().await;
        sink.send(message)
            .await
            .map_err(|e| ChatError::Transport(format!("WS send failed: {e}")))
    }

    /// Next decoded envelope, or `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.inbound_rx.recv().await
    }

    /// Send a close frame and stop the dispatch loop.
    pub async fn close(&mut self) -> ChatResult<()> {
        {
            let mut sink = self.ws_sink.lock().await;
            let _ = sink.send(Message::Close(None)).await;
        }
        self.dispatch_handle.abort();
        Ok(())
    }

    async fn dispatch_loop(
        mut stream: SplitStream<WsStream>,
        ws_sink: Arc<Mutex<WsSink>>,
        inbound_tx: mpsc::Sender<Envelope>,
    ) {
        let mut decoder = FrameDecoder::new();

        while let Some(msg) = stream.next().await {
            let envelopes = match msg {
                Ok(Message::Binary(data)) => match decoder.feed::<Envelope>(&data) {
                    Ok(decoded) => {
                        for e in &decoded.errors {
                            tracing::warn!(error = %e, "undecodable frame from server");
                        }
                        decoded.messages
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "frame stream reset");
                        continue;
                    }
                },
                Ok(Message::Text(text)) => match json_decode::<Envelope>(&text) {
                    Ok(envelope) => vec![envelope],
                    Err(e) => {
                        tracing::warn!(error = %e, "undecodable JSON from server");
                        continue;
                    }
                },
                Ok(Message::Ping(payload)) => {
                    let mut sink = ws_sink.lock().await;
                    let _ = sink.send(Message::Pong(payload)).await;
                    continue;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(error = %e, "WS read error");
                    break;
                }
            };

            for envelope in envelopes {
                if inbound_tx.send(envelope).await.is_err() {
                    tracing::debug!("session dropped, stopping dispatch loop");
                    return;
                }
            }
        }

        tracing::debug!("WebSocket dispatch loop ended");
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        self.dispatch_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_websocket_urls() {
        let err = WebSocketSession::connect("https://example.com", WireFormat::Cbor)
            .await
            .err()
            .expect("should fail");
        assert!(matches!(err, ChatError::Transport(_)));
    }
}
