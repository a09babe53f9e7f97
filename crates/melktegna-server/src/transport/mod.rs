//! Network transports. Clients connect over WebSocket only.

pub mod websocket;
