//! Subscription patterns
//!
//! - `*`       every path
//! - `a.b`     exactly `a.b`
//! - `a.b.*`   `a.b` and everything below it

use crate::storage::{KeyPath, PathError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const WILDCARD: &str = "*";
const SUBTREE_SUFFIX: &str = ".*";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SubscriptionPattern {
    All,
    Exact(KeyPath),
    Subtree(KeyPath),
}

impl SubscriptionPattern {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let raw = raw.trim();
        if raw == WILDCARD {
            return Ok(SubscriptionPattern::All);
        }
        match raw.strip_suffix(SUBTREE_SUFFIX) {
            Some(base) => {
                let base = KeyPath::parse(base)?;
                // the root's subtree is every path
                if base.is_root() {
                    Ok(SubscriptionPattern::All)
                } else {
                    Ok(SubscriptionPattern::Subtree(base))
                }
            }
            None => Ok(SubscriptionPattern::Exact(KeyPath::parse(raw)?)),
        }
    }

    pub fn matches(&self, path: &KeyPath) -> bool {
        match self {
            SubscriptionPattern::All => true,
            SubscriptionPattern::Exact(exact) => exact == path,
            SubscriptionPattern::Subtree(base) => base.contains(path),
        }
    }

    /// Every pattern that matches `path`. Lets the hub resolve subscribers
    /// with O(depth) map lookups instead of scanning every subscription.
    pub fn candidates(path: &KeyPath) -> impl Iterator<Item = SubscriptionPattern> + '_ {
        std::iter::once(SubscriptionPattern::All)
            .chain(std::iter::once(SubscriptionPattern::Exact(path.clone())))
            .chain(
                path.prefixes()
                    .filter(|prefix| !prefix.is_root())
                    .map(SubscriptionPattern::Subtree),
            )
    }
}

impl fmt::Display for SubscriptionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionPattern::All => f.write_str(WILDCARD),
            SubscriptionPattern::Exact(path) => write!(f, "{}", path),
            SubscriptionPattern::Subtree(path) => write!(f, "{}{}", path, SUBTREE_SUFFIX),
        }
    }
}

impl FromStr for SubscriptionPattern {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SubscriptionPattern {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SubscriptionPattern> for String {
    fn from(pattern: SubscriptionPattern) -> Self {
        pattern.to_string()
    }
}

impl From<KeyPath> for SubscriptionPattern {
    fn from(path: KeyPath) -> Self {
        SubscriptionPattern::Exact(path)
    }
}
