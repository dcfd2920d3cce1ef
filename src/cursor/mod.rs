//! keyseries Windowed Cursor
//!
//! A client-owned paging object over one key's history, bound at
//! construction to either the time or the index domain.
//!
//! ```text
//!            reload()                ok
//! Unknown ───────────► Loading ─────────► Idle
//!                        ▲   │
//!                        │   │ err / timeout
//!              reload()  │   ▼
//!   Idle/Error ──────────┘  Error   (last good page kept)
//! ```
//!
//! ```ignore
//! let mut cursor = IndexWindow::new(store.clone(), path, 0, 100);
//! cursor.reload().await;
//! while cursor.next().await {
//!     render(cursor.entries());
//! }
//! ```

mod domain;
mod source;
mod window;

pub use domain::{IndexDomain, TimeDomain, WindowDomain};
pub use source::SeriesSource;
pub use window::{Cursor, CursorHandle, IndexWindow, TimeWindow, Window};

use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Why a reload failed
#[derive(Debug, Error)]
pub enum CursorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Remote request failed: {0}")]
    Remote(String),

    #[error("Reload timed out after {0:?}")]
    Timeout(Duration),
}

/// Cursor defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorConfig {
    /// Abandon a reload after this many milliseconds (0 = wait forever)
    pub reload_timeout_ms: u64,
    /// Entries per page for index cursors
    pub page_size: u64,
    /// Seconds per page for time cursors
    pub page_span_secs: i64,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            reload_timeout_ms: 0,
            page_size: 100,
            page_span_secs: 3600,
        }
    }
}

impl CursorConfig {
    pub fn reload_timeout(&self) -> Option<Duration> {
        (self.reload_timeout_ms > 0).then(|| Duration::from_millis(self.reload_timeout_ms))
    }

    pub fn page_span(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.page_span_secs.max(1))
    }

    /// Apply the configured timeout to a freshly built window
    pub fn apply<D: WindowDomain>(&self, window: Window<D>) -> Window<D> {
        match self.reload_timeout() {
            Some(limit) => window.with_timeout(limit),
            None => window,
        }
    }
}
