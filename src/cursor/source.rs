//! Where a cursor gets its pages from

use crate::cursor::CursorError;
use crate::storage::{Entry, KeyPath};
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Range queries a cursor pages over. Implemented by the in-process
/// [`Store`] and by the HTTP client, so the same cursor runs locally or
/// against a server.
#[async_trait]
pub trait SeriesSource: Send + Sync {
    /// Entries with `start <= timestamp < end`
    async fn entries_between(
        &self,
        path: &KeyPath,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Entry>, CursorError>;

    /// Entries at positions `start..=end`
    async fn entries_at(
        &self,
        path: &KeyPath,
        start: u64,
        end: u64,
    ) -> Result<Vec<Entry>, CursorError>;
}

#[async_trait]
impl SeriesSource for Store {
    async fn entries_between(
        &self,
        path: &KeyPath,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Entry>, CursorError> {
        Ok(self.get_time(path, start, end).await?)
    }

    async fn entries_at(
        &self,
        path: &KeyPath,
        start: u64,
        end: u64,
    ) -> Result<Vec<Entry>, CursorError> {
        Ok(self.get_index(path, start, end).await?)
    }
}
