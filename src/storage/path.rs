//! Hierarchical key paths
//!
//! A `KeyPath` is a dot-separated sequence of segments (`plant.line1.temp`).
//! The empty path denotes the root of the namespace.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Separator between path segments
pub const SEPARATOR: char = '.';

/// Errors produced when parsing a key path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Empty segment in path '{0}'")]
    EmptySegment(String),

    #[error("Invalid character {ch:?} in path '{path}'")]
    InvalidCharacter { path: String, ch: char },
}

/// Full path of a node in the key namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// The namespace root
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dotted path. Surrounding whitespace is ignored and an empty
    /// string yields the root.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut segments = Vec::new();
        for segment in trimmed.split(SEPARATOR) {
            Self::validate_segment(trimmed, segment)?;
            segments.push(segment.to_string());
        }

        Ok(Self { segments })
    }

    fn validate_segment(path: &str, segment: &str) -> Result<(), PathError> {
        if segment.is_empty() {
            return Err(PathError::EmptySegment(path.to_string()));
        }
        if let Some(ch) = segment.chars().find(|c| c.is_whitespace() || *c == '*' || *c == SEPARATOR) {
            return Err(PathError::InvalidCharacter {
                path: path.to_string(),
                ch,
            });
        }
        Ok(())
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last segment, `None` for the root
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Parent path, `None` for the root
    pub fn parent(&self) -> Option<KeyPath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append one segment
    pub fn child(&self, segment: &str) -> Result<KeyPath, PathError> {
        Self::validate_segment(segment, segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    /// True when `self` equals `other` or is one of its ancestors
    pub fn contains(&self, other: &KeyPath) -> bool {
        other.segments.len() >= self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// Every prefix of this path from the root down to (and including) itself
    pub fn prefixes(&self) -> impl Iterator<Item = KeyPath> + '_ {
        (0..=self.segments.len()).map(move |n| Self {
            segments: self.segments[..n].to_vec(),
        })
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", SEPARATOR)?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for KeyPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for KeyPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for KeyPath {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<KeyPath> for String {
    fn from(path: KeyPath) -> Self {
        path.to_string()
    }
}
