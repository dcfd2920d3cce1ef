//! keyseries Key Index
//!
//! The in-memory hierarchical namespace. Every path that has ever been
//! written, and every ancestor of one, has a node; nodes are never removed.
//!
//! ```text
//! ""                 (root, always present)
//! ├── plant
//! │   ├── boiler     (folder: no type)
//! │   │   └── temp   (leaf: type = float, status = Idle)
//! │   └── pump
//! └── _errors
//!     └── error
//! ```

mod key_index;

pub use key_index::{Key, KeyIndex, KeyNode};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Last-known outcome of the most recent load or write touching a key
/// (or of the most recent reload of a cursor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Status {
    Idle = 0,
    Loading = 1,
    Error = 2,
    #[default]
    Unknown = 3,
}

impl Status {
    /// Map an externally observed label back to a status.
    ///
    /// Accepts the status names themselves (any case) and the busy/ready
    /// glyph names a UI might report. Anything else is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "idle" | "ready" | "arrow" | "default" => Status::Idle,
            "loading" | "busy" | "wait" | "progress" | "appstarting" => Status::Loading,
            "error" | "failed" | "no" | "not-allowed" => Status::Error,
            _ => Status::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Loading => "loading",
            Status::Error => "error",
            Status::Unknown => "unknown",
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Status::Idle,
            1 => Status::Loading,
            2 => Status::Error,
            _ => Status::Unknown,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
