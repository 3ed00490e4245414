//! Push-update adapters.

mod websocket;

pub use websocket::WebSocketChannel;
