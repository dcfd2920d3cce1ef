//! WebSocket Message Types
//!
//! Defines all message types for WebSocket communication between
//! live-view clients and the keyseries server.

use serde::{Deserialize, Serialize};

use crate::hub::Notification;
use crate::storage::{Entry, KeyPath};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to paths or patterns (`a.b`, `a.b.*`, `*`)
    Subscribe { paths: Vec<String> },
    /// Drop subscriptions
    Unsubscribe { paths: Vec<String> },
    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established
    Connected { connection_id: String },
    /// Patterns accepted
    Subscribed { paths: Vec<String> },
    /// Patterns removed
    Unsubscribed { paths: Vec<String> },
    /// Entries of one successful write
    Entries { path: KeyPath, entries: Vec<Entry> },
    /// Pong response to ping
    Pong,
    /// Error message
    Error { message: String },
}

impl From<Notification> for ServerMessage {
    fn from(notification: Notification) -> Self {
        ServerMessage::Entries {
            path: notification.path,
            entries: notification.entries.to_vec(),
        }
    }
}
