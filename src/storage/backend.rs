//! Backing medium abstraction
//!
//! The store only needs two things from persistence: ordered append of a
//! batch under a path, and an ordered scan of everything appended under a
//! path. `load` returns entries in append order; sorting by timestamp is the
//! store's job.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::path::KeyPath;
use crate::storage::types::Entry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name for logs and health output
    fn name(&self) -> &'static str;

    /// Durably append one batch. Either the whole batch becomes visible to
    /// later `load` calls or none of it does.
    async fn append(&self, path: &KeyPath, entries: &[Entry]) -> StorageResult<()>;

    /// Every entry ever appended under `path`, in append order
    async fn load(&self, path: &KeyPath) -> StorageResult<Vec<Entry>>;

    /// All paths that hold at least one appended batch
    async fn paths(&self) -> StorageResult<Vec<KeyPath>>;
}

/// Volatile in-process backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    series: Mutex<HashMap<KeyPath, Vec<Entry>>>,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the medium going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory backend offline".into()));
        }
        Ok(())
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, HashMap<KeyPath, Vec<Entry>>>> {
        self.series
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("memory backend poisoned: {}", e)))
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn append(&self, path: &KeyPath, entries: &[Entry]) -> StorageResult<()> {
        self.check()?;
        self.lock()?
            .entry(path.clone())
            .or_default()
            .extend_from_slice(entries);
        Ok(())
    }

    async fn load(&self, path: &KeyPath) -> StorageResult<Vec<Entry>> {
        self.check()?;
        Ok(self.lock()?.get(path).cloned().unwrap_or_default())
    }

    async fn paths(&self) -> StorageResult<Vec<KeyPath>> {
        self.check()?;
        let mut paths: Vec<KeyPath> = self.lock()?.keys().cloned().collect();
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_append_and_load() {
        let backend = MemoryBackend::new();
        let path = KeyPath::parse("a.b").unwrap();
        let now = Utc::now();

        backend
            .append(&path, &[Entry::new("x", 1i64, now)])
            .await
            .unwrap();
        backend
            .append(&path, &[Entry::new("y", 2i64, now)])
            .await
            .unwrap();

        let loaded = backend.load(&path).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].key, "x");
        assert_eq!(backend.paths().await.unwrap(), vec![path]);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let backend = MemoryBackend::new();
        let path = KeyPath::parse("a").unwrap();
        backend.set_available(false);

        let result = backend.append(&path, &[]).await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));

        backend.set_available(true);
        assert!(backend.load(&path).await.unwrap().is_empty());
    }
}
