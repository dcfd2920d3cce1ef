//! keyseries storage layer
//!
//! Data types and the pluggable backing media:
//!
//! - **path**: hierarchical `KeyPath`
//! - **types**: `Value`, `Sample`, `Entry`, `Envelope`
//! - **compression**: batch encoding + optional LZ4
//! - **backend**: the `Backend` trait and an in-memory implementation
//! - **file**: one append-only log per key (default medium)
//! - **sqlite**: SQLite table of batches
//! - **error**: backing medium errors
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   Envelope → validate → encode batch → frame (len|data|crc) → append
//!
//! Read Path (on first touch of a key):
//!   load frames → decode batches → store sorts by (timestamp, seq)
//! ```

pub mod backend;
pub mod compression;
pub mod error;
pub mod file;
pub mod path;
pub mod sqlite;
pub mod types;

pub use backend::{Backend, MemoryBackend};
pub use compression::{decode_batch, encode_batch, CompressionType};
pub use error::{StorageError, StorageResult};
pub use file::{FileBackend, FileBackendConfig, SyncMode};
pub use path::{KeyPath, PathError};
pub use sqlite::SqliteBackend;
pub use types::{Entry, Envelope, Sample, Value, ValueType};
