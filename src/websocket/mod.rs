//! WebSocket Live Updates
//!
//! Transport for the hub: each socket is one hub connection.
//!
//! - **Handler**: WebSocket upgrade, connection lifecycle
//! - **Messages**: client and server message formats
//!
//! ## Example
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:8082/ws');
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({type: 'subscribe', paths: ['plant.boiler.*']}));
//! };
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'entries') console.log(msg.path, msg.entries);
//! };
//! ```

mod handler;
mod messages;

pub use handler::websocket_handler;
pub use messages::{ClientMessage, ServerMessage};
