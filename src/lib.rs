//! # keyseries
//!
//! Hierarchical key-addressed time-series store. Producers write batches of
//! typed, timestamped entries under dot-separated keys; consumers browse the
//! key namespace, page through a key's history with a windowed cursor, and
//! receive new entries live through the subscription hub.
//!
//! ## Modules
//!
//! - [`storage`]: core types and the pluggable backing media (file, SQLite, memory)
//! - [`index`]: the in-memory key namespace
//! - [`store`]: write and read paths over the namespace
//! - [`hub`]: subscription registry and fan-out
//! - [`cursor`]: time and index windows over one key
//! - [`events`]: failure events, recorded as entries under `_errors`
//! - [`api`]: REST API server with Axum, plus its HTTP client
//! - [`websocket`]: live updates transport for the hub
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keyseries::cursor::{Cursor, IndexWindow};
//! use keyseries::storage::{Envelope, KeyPath, Sample};
//! use keyseries::store::Store;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(Store::in_memory().await?);
//!     let path = KeyPath::parse("plant.boiler.temp")?;
//!
//!     store
//!         .write(Envelope {
//!             path: path.clone(),
//!             entries: vec![Sample::new("temp", 21.5), Sample::new("temp", 21.7)],
//!         })
//!         .await?;
//!
//!     let mut cursor = IndexWindow::new(store.clone(), path, 0, 100);
//!     cursor.reload().await;
//!     println!("{} entries", cursor.entries().len());
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod cursor;
pub mod events;
pub mod hub;
pub mod index;
pub mod storage;
pub mod store;
pub mod websocket;

pub use storage::{
    Backend, Entry, Envelope, KeyPath, PathError, Sample, StorageError, StorageResult, Value,
    ValueType,
};

pub use index::{Key, Status};

pub use store::{Store, StoreBuilder, StoreConfig, StoreError, WriteError, WriteReceipt};

pub use hub::{Hub, HubConfig, HubError, Notification, SubscriptionPattern};

pub use cursor::{Cursor, CursorError, IndexWindow, SeriesSource, TimeWindow};

pub use events::{ErrorKeyRecorder, LogEvent, LogSink, Severity};

pub use api::{build_router, serve, ApiConfig, ApiError, AppState, RemoteClient};

pub use config::{Config, ConfigError};
