//! keyseries Time-Series Store
//!
//! - **engine**: `Store` and its builder, the read and write paths
//! - **series**: one key's sorted entry sequence
//! - **error**: `StoreError` / `WriteError`

mod engine;
mod error;
mod series;

pub use engine::{Store, StoreBuilder};
pub use error::{StoreError, StoreResult, WriteError};

use crate::storage::KeyPath;
use serde::{Deserialize, Serialize};

/// Behaviour switches for the store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Reject the whole envelope when one sample fails validation. When
    /// false, failing samples are dropped and the rest is written.
    pub atomic_envelopes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            atomic_envelopes: true,
        }
    }
}

/// Result of a successful write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReceipt {
    pub path: KeyPath,
    pub written: usize,
    /// Samples discarded by non-atomic validation
    pub dropped: usize,
}

/// Store statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub backend: String,
    /// Namespace nodes, root excluded
    pub keys: usize,
    /// Series held in memory with at least one entry
    pub resident_series: usize,
    /// Entries held in memory
    pub entries: usize,
}
