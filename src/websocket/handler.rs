//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the connection lifecycle.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::messages::{ClientMessage, ServerMessage};
use crate::api::AppState;
use crate::hub::{Hub, SubscriptionPattern};

/// WebSocket upgrade handler
///
/// Upgrades the HTTP connection and attaches it to the hub.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize message");
            None
        }
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (mut sender, mut receiver) = socket.split();

    let (connection_id, mut notifications) = match hub.connect_channel() {
        Ok(attached) => attached,
        Err(e) => {
            tracing::error!(error = %e, "Failed to attach WebSocket connection");
            if let Some(msg) = encode(&ServerMessage::Error {
                message: e.to_string(),
            }) {
                let _ = sender.send(msg).await;
            }
            return;
        }
    };

    let connected = encode(&ServerMessage::Connected {
        connection_id: connection_id.clone(),
    });
    let sent = match connected {
        Some(msg) => sender.send(msg).await.is_ok(),
        None => false,
    };
    if !sent {
        tracing::error!(connection_id = %connection_id, "Failed to send connected message");
        hub.unregister(&connection_id);
        return;
    }

    // Replies to this client (acks, pongs, errors)
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let conn_id_for_send = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                Some(reply) = reply_rx.recv() => reply,
                Some(notification) = notifications.recv() => ServerMessage::from(notification),
                else => break,
            };
            let Some(frame) = encode(&msg) else {
                continue;
            };
            if sender.send(frame).await.is_err() {
                tracing::debug!(
                    connection_id = %conn_id_for_send,
                    "WebSocket send failed, closing connection"
                );
                break;
            }
        }
    });

    let hub_for_recv = Arc::clone(&hub);
    let conn_id_for_recv = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&hub_for_recv, &conn_id_for_recv, msg, &reply_tx) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %conn_id_for_recv,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    hub.unregister(&connection_id);
}

/// Handle a received WebSocket message
///
/// Returns false if the connection should be closed.
fn handle_ws_message(
    hub: &Hub,
    connection_id: &str,
    message: Message,
    reply: &mpsc::UnboundedSender<ServerMessage>,
) -> bool {
    match message {
        Message::Text(text) => {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_client_message(hub, connection_id, client_msg, reply),
                Err(e) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        error = %e,
                        text = %text,
                        "Invalid client message"
                    );
                    let _ = reply.send(ServerMessage::Error {
                        message: format!("Invalid message format: {}", e),
                    });
                }
            }
            true
        }
        Message::Binary(_) => {
            let _ = reply.send(ServerMessage::Error {
                message: "Binary messages not supported".to_string(),
            });
            true
        }
        // Axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "Client requested close");
            false
        }
    }
}

/// Handle a parsed client message
fn handle_client_message(
    hub: &Hub,
    connection_id: &str,
    message: ClientMessage,
    reply: &mpsc::UnboundedSender<ServerMessage>,
) {
    let response = match message {
        ClientMessage::Subscribe { paths } => {
            match hub.register_all(connection_id, paths.iter().map(String::as_str)) {
                Ok(accepted) => ServerMessage::Subscribed {
                    paths: accepted.iter().map(ToString::to_string).collect(),
                },
                Err(e) => {
                    tracing::error!(connection_id = %connection_id, error = %e, "Subscribe error");
                    ServerMessage::Error {
                        message: e.to_string(),
                    }
                }
            }
        }
        ClientMessage::Unsubscribe { paths } => {
            let mut removed = Vec::new();
            for raw in paths {
                let pattern = match SubscriptionPattern::parse(&raw) {
                    Ok(pattern) => pattern,
                    Err(_) => continue,
                };
                match hub.unsubscribe(connection_id, &pattern) {
                    Ok(true) => removed.push(pattern.to_string()),
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(
                            connection_id = %connection_id,
                            error = %e,
                            "Unsubscribe error"
                        );
                        break;
                    }
                }
            }
            ServerMessage::Unsubscribed { paths: removed }
        }
        ClientMessage::Ping => ServerMessage::Pong,
    };

    let _ = reply.send(response);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Entry, KeyPath};
    use chrono::Utc;

    fn text(json: &str) -> Message {
        Message::Text(json.to_string())
    }

    #[tokio::test]
    async fn test_subscribe_flow() {
        let hub = Hub::default();
        let (id, mut notifications) = hub.connect_channel().unwrap();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();

        assert!(handle_ws_message(
            &hub,
            &id,
            text(r#"{"type":"subscribe","paths":["a.b","x.*","bad path"]}"#),
            &reply_tx,
        ));
        match reply_rx.recv().await.unwrap() {
            ServerMessage::Subscribed { paths } => assert_eq!(paths, vec!["a.b", "x.*"]),
            other => panic!("unexpected {:?}", other),
        }

        let path = KeyPath::parse("x.y").unwrap();
        hub.notify(&path, &[Entry::new("v", 1i64, Utc::now())]);
        match ServerMessage::from(notifications.recv().await.unwrap()) {
            ServerMessage::Entries { path: got, entries } => {
                assert_eq!(got, path);
                assert_eq!(entries.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }

        handle_ws_message(
            &hub,
            &id,
            text(r#"{"type":"unsubscribe","paths":["x.*","never"]}"#),
            &reply_tx,
        );
        match reply_rx.recv().await.unwrap() {
            ServerMessage::Unsubscribed { paths } => assert_eq!(paths, vec!["x.*"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ping_invalid_and_close() {
        let hub = Hub::default();
        let (id, _notifications) = hub.connect_channel().unwrap();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();

        handle_ws_message(&hub, &id, text(r#"{"type":"ping"}"#), &reply_tx);
        assert!(matches!(reply_rx.recv().await, Some(ServerMessage::Pong)));

        assert!(handle_ws_message(&hub, &id, text("not json"), &reply_tx));
        assert!(matches!(
            reply_rx.recv().await,
            Some(ServerMessage::Error { .. })
        ));

        assert!(!handle_ws_message(&hub, &id, Message::Close(None), &reply_tx));
    }
}
