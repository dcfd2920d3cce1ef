//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON, and shared with
//! the HTTP client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::index::{Key, Status};
use crate::storage::{Entry, KeyPath, ValueType};
use crate::store::StoreStats;

// ============================================
// WRITE DTOs
// ============================================

/// Write response
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteResponse {
    /// Status: "ok" or "partial" when samples were dropped
    pub status: String,
    pub path: KeyPath,
    pub written: usize,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub dropped: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

// ============================================
// QUERY DTOs
// ============================================

/// `?path=` for the namespace browser; absent means root
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct KeysQuery {
    #[serde(default)]
    pub path: Option<String>,
}

/// A namespace node as returned by `/keys`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyDto {
    pub path: KeyPath,
    pub name: String,
    pub has_children: bool,
    pub status: Status,
    #[serde(rename = "type")]
    pub value_type: Option<ValueType>,
}

impl From<Key> for KeyDto {
    fn from(key: Key) -> Self {
        Self {
            name: key.path.name().unwrap_or_default().to_string(),
            has_children: !key.children.is_empty(),
            status: key.status,
            value_type: key.value_type,
            path: key.path,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeysResponse {
    pub path: KeyPath,
    pub keys: Vec<KeyDto>,
}

/// Half-open time range, RFC 3339 bounds
#[derive(Debug, Serialize, Deserialize)]
pub struct TimeRangeQuery {
    pub path: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Inclusive index range
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexRangeQuery {
    pub path: String,
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeriesResponse {
    pub path: KeyPath,
    pub count: usize,
    pub entries: Vec<Entry>,
}

// ============================================
// HEALTH DTOs
// ============================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "unhealthy"
    pub status: String,
    /// "ok" or "error"
    pub storage: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub connections: usize,
    pub stats: StoreStatsDto,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreStatsDto {
    pub backend: String,
    pub keys: usize,
    pub resident_series: usize,
    pub entries: usize,
}

impl From<StoreStats> for StoreStatsDto {
    fn from(stats: StoreStats) -> Self {
        Self {
            backend: stats.backend,
            keys: stats.keys,
            resident_series: stats.resident_series,
            entries: stats.entries,
        }
    }
}
