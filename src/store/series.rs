//! Per-key entry sequence
//!
//! Entries are kept sorted by timestamp; entries with equal timestamps stay
//! in arrival order. The sequence is only resident in memory after the first
//! load from the backend.

use crate::storage::Entry;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

#[derive(Debug)]
pub(crate) struct SeriesState {
    resident: bool,
    entries: Vec<Entry>,
}

impl SeriesState {
    pub(crate) fn is_resident(&self) -> bool {
        self.resident
    }

    /// Install what the backend returned, in append order
    pub(crate) fn install(&mut self, mut loaded: Vec<Entry>) {
        // stable: ties keep append order
        loaded.sort_by_key(|entry| entry.timestamp);
        self.entries = loaded;
        self.resident = true;
    }

    pub(crate) fn append(&mut self, batch: &[Entry]) {
        for entry in batch {
            let at = self
                .entries
                .partition_point(|existing| existing.timestamp <= entry.timestamp);
            if at == self.entries.len() {
                self.entries.push(entry.clone());
            } else {
                self.entries.insert(at, entry.clone());
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries with `start <= timestamp < end`
    pub(crate) fn time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> &[Entry] {
        if start >= end {
            return &[];
        }
        let lo = self.entries.partition_point(|e| e.timestamp < start);
        let hi = self.entries.partition_point(|e| e.timestamp < end);
        &self.entries[lo..hi]
    }

    /// Entries at positions `start..=end`, truncated to what exists
    pub(crate) fn index_range(&self, start: u64, end: u64) -> &[Entry] {
        if start > end {
            return &[];
        }
        let len = self.entries.len();
        let lo = usize::try_from(start).unwrap_or(usize::MAX);
        if lo >= len {
            return &[];
        }
        let hi = usize::try_from(end).unwrap_or(usize::MAX).min(len - 1);
        &self.entries[lo..=hi]
    }
}

/// One key's data, guarded for exclusive append and shared reads
#[derive(Debug)]
pub struct Series {
    pub(crate) state: RwLock<SeriesState>,
}

impl Default for Series {
    /// Namespace nodes created at runtime hold no persisted data yet, so
    /// they start resident and empty.
    fn default() -> Self {
        Self {
            state: RwLock::new(SeriesState {
                resident: true,
                entries: Vec::new(),
            }),
        }
    }
}

impl Series {
    /// Mark the series as backed by persisted data not yet loaded
    pub(crate) async fn evict(&self) {
        let mut state = self.state.write().await;
        state.resident = false;
        state.entries = Vec::new();
    }
}
