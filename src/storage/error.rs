//! Backing medium error types
//!
//! Everything a `Backend` can fail with. The store surfaces all of these to
//! its callers as `StoreUnavailable`.

use thiserror::Error;

/// Errors that can occur in a backing medium
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Data corruption detected (checksum mismatch, oversized frame, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// SQLite backend failure
    #[error("SQLite error: {0}")]
    Sqlite(String),

    /// Backing medium refused the operation
    #[error("Backing medium unavailable: {0}")]
    Unavailable(String),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Sqlite(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Unavailable(format!("background task failed: {}", err))
    }
}

/// Result type alias for backend operations
pub type StorageResult<T> = Result<T, StorageError>;
