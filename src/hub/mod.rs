//! keyseries Subscription Hub
//!
//! Registry of live connections and the paths they watch. After every
//! successful write the store calls [`Hub::notify`], which resolves the
//! matching connections and hands each one the new entries exactly once.
//!
//! ```text
//! Store::write(a.b) ──► Hub::notify(a.b, entries)
//!                           │  candidates: *, a.b, a.*, a.b.*
//!                           ▼
//!                  subscriptions[pattern] → {conn ids}   (union, dedup)
//!                           │
//!                           ▼
//!                  conn.sender.try_send(Notification)    (never blocks)
//! ```
//!
//! Everything here is synchronous: `notify` runs while the store still holds
//! the key's write lock, so it must not await and must not block on a slow
//! subscriber.

mod pattern;

pub use pattern::SubscriptionPattern;

use crate::storage::{Entry, KeyPath, PathError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Unique identifier for an attached connection
pub type ConnectionId = String;

/// What a subscriber receives after a write
#[derive(Debug, Clone)]
pub struct Notification {
    pub path: KeyPath,
    pub entries: Arc<[Entry]>,
}

/// Configuration for the hub
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Per-connection queue depth; a full queue drops notifications
    pub channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            channel_capacity: 256,
        }
    }
}

/// Errors that can occur in the hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    #[error("Invalid subscription pattern: {0}")]
    InvalidPattern(#[from] PathError),

    #[error("Delivery to {connection_id} failed: {reason}")]
    DeliveryFailure {
        connection_id: ConnectionId,
        reason: &'static str,
    },
}

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

struct ConnectionHandle {
    sender: mpsc::Sender<Notification>,
    patterns: HashSet<SubscriptionPattern>,
}

#[derive(Default)]
struct Registry {
    /// ConnectionId → handle
    connections: HashMap<ConnectionId, ConnectionHandle>,
    /// Pattern → subscribed connections
    subscriptions: HashMap<SubscriptionPattern, HashSet<ConnectionId>>,
}

impl Registry {
    fn detach_pattern(&mut self, id: &str, pattern: &SubscriptionPattern) {
        if let Some(subscribers) = self.subscriptions.get_mut(pattern) {
            subscribers.remove(id);
            if subscribers.is_empty() {
                self.subscriptions.remove(pattern);
            }
        }
    }
}

/// Manages connections and subscriptions
pub struct Hub {
    registry: RwLock<Registry>,
    config: HubConfig,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Attach a connection. Notifications for its subscriptions are pushed
    /// into `sender`.
    pub fn connect(&self, sender: mpsc::Sender<Notification>) -> Result<ConnectionId, HubError> {
        let mut registry = self.write();
        if registry.connections.len() >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        let id = Uuid::new_v4().to_string();
        registry.connections.insert(
            id.clone(),
            ConnectionHandle {
                sender,
                patterns: HashSet::new(),
            },
        );

        tracing::info!(connection_id = %id, "Connection attached");
        Ok(id)
    }

    /// Attach a connection with a fresh channel of the configured capacity
    pub fn connect_channel(
        &self,
    ) -> Result<(ConnectionId, mpsc::Receiver<Notification>), HubError> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let id = self.connect(tx)?;
        Ok((id, rx))
    }

    /// Add a subscription. Registering the same pattern twice is a no-op.
    pub fn register(
        &self,
        id: &str,
        pattern: impl Into<SubscriptionPattern>,
    ) -> Result<(), HubError> {
        let pattern = pattern.into();
        let mut registry = self.write();
        let handle = registry
            .connections
            .get_mut(id)
            .ok_or_else(|| HubError::ConnectionNotFound(id.to_string()))?;

        handle.patterns.insert(pattern.clone());
        registry
            .subscriptions
            .entry(pattern.clone())
            .or_default()
            .insert(id.to_string());

        tracing::debug!(connection_id = %id, pattern = %pattern, "Subscribed");
        Ok(())
    }

    /// Parse and add several patterns at once; returns the ones accepted
    pub fn register_all<'a>(
        &self,
        id: &str,
        patterns: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<SubscriptionPattern>, HubError> {
        let mut accepted = Vec::new();
        for raw in patterns {
            match SubscriptionPattern::parse(raw) {
                Ok(pattern) => {
                    self.register(id, pattern.clone())?;
                    accepted.push(pattern);
                }
                Err(e) => tracing::warn!(pattern = %raw, error = %e, "Invalid pattern ignored"),
            }
        }
        Ok(accepted)
    }

    /// Drop one subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: &str, pattern: &SubscriptionPattern) -> Result<bool, HubError> {
        let mut registry = self.write();
        let handle = registry
            .connections
            .get_mut(id)
            .ok_or_else(|| HubError::ConnectionNotFound(id.to_string()))?;

        let removed = handle.patterns.remove(pattern);
        if removed {
            registry.detach_pattern(id, pattern);
            tracing::debug!(connection_id = %id, pattern = %pattern, "Unsubscribed");
        }
        Ok(removed)
    }

    /// Detach a connection and drop all its subscriptions. Safe to call for
    /// unknown or already-detached connections.
    pub fn unregister(&self, id: &str) {
        let mut registry = self.write();
        let Some(handle) = registry.connections.remove(id) else {
            return;
        };
        for pattern in &handle.patterns {
            registry.detach_pattern(id, pattern);
        }

        tracing::info!(connection_id = %id, "Connection detached");
    }

    /// Deliver `entries` to every connection with a matching subscription.
    ///
    /// Never blocks: a subscriber whose queue is full or closed misses this
    /// notification and the failure is logged.
    pub fn notify(&self, path: &KeyPath, entries: &[Entry]) -> DeliveryReport {
        let registry = self.read();
        if registry.subscriptions.is_empty() {
            return DeliveryReport::default();
        }

        let mut targets: HashSet<&ConnectionId> = HashSet::new();
        for candidate in SubscriptionPattern::candidates(path) {
            if let Some(ids) = registry.subscriptions.get(&candidate) {
                targets.extend(ids.iter());
            }
        }
        if targets.is_empty() {
            return DeliveryReport::default();
        }

        let notification = Notification {
            path: path.clone(),
            entries: Arc::from(entries),
        };

        let mut report = DeliveryReport::default();
        for id in targets {
            let Some(handle) = registry.connections.get(id) else {
                continue;
            };
            match handle.sender.try_send(notification.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    let failure = HubError::DeliveryFailure {
                        connection_id: id.clone(),
                        reason: match e {
                            TrySendError::Full(_) => "queue full",
                            TrySendError::Closed(_) => "connection closed",
                        },
                    };
                    tracing::warn!(path = %path, error = %failure, "Notification dropped");
                }
            }
        }

        if report.delivered > 0 {
            tracing::trace!(
                path = %path,
                subscribers = report.delivered,
                entries = entries.len(),
                "Notified subscribers"
            );
        }
        report
    }

    /// Current connection count
    pub fn connection_count(&self) -> usize {
        self.read().connections.len()
    }

    /// Number of connections subscribed with exactly `pattern`
    pub fn subscription_count(&self, pattern: &SubscriptionPattern) -> usize {
        self.read()
            .subscriptions
            .get(pattern)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Patterns held by a connection
    pub fn patterns_of(&self, id: &str) -> Option<Vec<SubscriptionPattern>> {
        self.read()
            .connections
            .get(id)
            .map(|h| h.patterns.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn path(s: &str) -> KeyPath {
        KeyPath::parse(s).unwrap()
    }

    fn entries(n: i64) -> Vec<Entry> {
        let now = Utc::now();
        (0..n).map(|i| Entry::new("v", i, now)).collect()
    }

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.channel_capacity, 256);
    }

    #[test]
    fn test_connect_unregister() {
        let hub = Hub::default();
        let (id, _rx) = hub.connect_channel().unwrap();
        assert!(!id.is_empty());
        assert_eq!(hub.connection_count(), 1);

        hub.unregister(&id);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let hub = Hub::default();
        hub.unregister("never-connected");
        hub.unregister("never-connected");

        let (id, _rx) = hub.connect_channel().unwrap();
        hub.unregister(&id);
        hub.unregister(&id);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_connection_limit() {
        let hub = Hub::new(HubConfig {
            max_connections: 1,
            channel_capacity: 4,
        });
        let (_id, _rx) = hub.connect_channel().unwrap();
        assert!(matches!(
            hub.connect_channel(),
            Err(HubError::TooManyConnections(1))
        ));
    }

    #[test]
    fn test_register_requires_connection() {
        let hub = Hub::default();
        let result = hub.register("ghost", path("a"));
        assert!(matches!(result, Err(HubError::ConnectionNotFound(_))));
    }

    #[tokio::test]
    async fn test_exact_subscription() {
        let hub = Hub::default();
        let (id, mut rx) = hub.connect_channel().unwrap();
        hub.register(&id, path("a.b")).unwrap();

        let report = hub.notify(&path("a.b"), &entries(3));
        assert_eq!(report.delivered, 1);
        let got = rx.recv().await.unwrap();
        assert_eq!(got.path, path("a.b"));
        assert_eq!(got.entries.len(), 3);

        assert_eq!(hub.notify(&path("x.y"), &entries(1)), DeliveryReport::default());
        assert_eq!(hub.notify(&path("a.b.c"), &entries(1)), DeliveryReport::default());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_overlapping_patterns_deliver_once() {
        let hub = Hub::default();
        let (id, mut rx) = hub.connect_channel().unwrap();
        let accepted = hub.register_all(&id, ["*", "a.*", "a.b", "bad..pattern"]).unwrap();
        assert_eq!(accepted.len(), 3);

        let report = hub.notify(&path("a.b"), &entries(2));
        assert_eq!(report.delivered, 1);
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_root_subtree_receives_everything() {
        let hub = Hub::default();
        let (id, mut rx) = hub.connect_channel().unwrap();
        hub.register(&id, SubscriptionPattern::parse(".*").unwrap())
            .unwrap();

        assert_eq!(hub.notify(&path("x"), &entries(1)).delivered, 1);
        assert_eq!(hub.notify(&path("a.b.c"), &entries(1)).delivered, 1);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn test_unsubscribe() {
        let hub = Hub::default();
        let (id, mut rx) = hub.connect_channel().unwrap();
        let pattern = SubscriptionPattern::parse("a.*").unwrap();
        hub.register(&id, pattern.clone()).unwrap();
        assert_eq!(hub.subscription_count(&pattern), 1);

        assert!(hub.unsubscribe(&id, &pattern).unwrap());
        assert!(!hub.unsubscribe(&id, &pattern).unwrap());
        assert_eq!(hub.subscription_count(&pattern), 0);

        hub.notify(&path("a.b"), &entries(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_subscriber_is_isolated() {
        let hub = Hub::new(HubConfig {
            max_connections: 10,
            channel_capacity: 1,
        });
        let (slow, _slow_rx) = hub.connect_channel().unwrap();
        let (fast, mut fast_rx) = hub.connect_channel().unwrap();
        hub.register(&slow, path("k")).unwrap();
        hub.register(&fast, path("k")).unwrap();

        let first = hub.notify(&path("k"), &entries(1));
        assert_eq!(first.delivered, 2);
        fast_rx.try_recv().unwrap();

        // slow never drains, its queue of one is now full
        let second = hub.notify(&path("k"), &entries(1));
        assert_eq!(second, DeliveryReport { delivered: 1, failed: 1 });
        assert!(fast_rx.try_recv().is_ok());
    }

    #[test]
    fn test_closed_subscriber_is_isolated() {
        let hub = Hub::default();
        let (gone, gone_rx) = hub.connect_channel().unwrap();
        let (live, mut live_rx) = hub.connect_channel().unwrap();
        hub.register(&gone, SubscriptionPattern::All).unwrap();
        hub.register(&live, SubscriptionPattern::All).unwrap();
        drop(gone_rx);

        let report = hub.notify(&path("k"), &entries(1));
        assert_eq!(report, DeliveryReport { delivered: 1, failed: 1 });
        assert!(live_rx.try_recv().is_ok());
    }
}
