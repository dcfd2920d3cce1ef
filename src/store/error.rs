//! Store error types

use crate::storage::{KeyPath, PathError, StorageError, ValueType};
use thiserror::Error;

/// Why a write was rejected
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Type mismatch at entry {index} ('{key}'): declared {expected}, got {actual}")]
    TypeMismatch {
        /// Position of the offending sample in the envelope
        index: usize,
        key: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] StorageError),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl WriteError {
    /// Whether retrying the same envelope may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, WriteError::StoreUnavailable(_))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Key not found: '{0}'")]
    NotFound(KeyPath),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] StorageError),

    #[error("Invalid path: {0}")]
    InvalidPath(#[from] PathError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::StoreUnavailable(_) => true,
            StoreError::Write(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
