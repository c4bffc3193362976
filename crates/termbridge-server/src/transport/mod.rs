//! Network transport: a WebSocket listener at a fixed endpoint.

pub mod websocket;

pub use websocket::{WsConnection, WsListener};
