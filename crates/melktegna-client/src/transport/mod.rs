//! Client-side transports. Only WebSocket is supported.

pub mod websocket;

pub use websocket::WebSocketSession;
