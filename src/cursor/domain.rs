//! Bound arithmetic for the two paging domains
//!
//! | domain | Bound         | Step     | End                 | Next allowed      |
//! |--------|---------------|----------|---------------------|-------------------|
//! | time   | DateTime<Utc> | Duration | start + count       | always            |
//! | index  | u64           | u64      | start + count - 1   | page was full     |
//!
//! Time windows are half-open, index windows are inclusive.

use crate::cursor::{CursorError, SeriesSource};
use crate::storage::{Entry, KeyPath};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::fmt::Debug;

#[async_trait]
pub trait WindowDomain: Send + Sync + 'static {
    type Bound: Copy + Debug + PartialEq + Send + Sync + 'static;
    type Step: Copy + Debug + PartialEq + Send + Sync + 'static;

    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Clamp a requested page size into the domain's valid range
    fn normalize(&self, count: Self::Step) -> Self::Step {
        count
    }

    fn end(&self, start: Self::Bound, count: Self::Step) -> Self::Bound;

    /// Count that makes `end(start, count) == end`, `None` when that count
    /// would not be positive
    fn count_for(&self, start: Self::Bound, end: Self::Bound) -> Option<Self::Step>;

    /// Start of the following page, `None` to refuse
    fn advance(&self, start: Self::Bound, count: Self::Step) -> Option<Self::Bound>;

    /// Start of the preceding page, `None` to refuse
    fn retreat(&self, start: Self::Bound, count: Self::Step) -> Option<Self::Bound>;

    /// Whether the current page permits moving forward
    fn allows_next(&self, page_len: usize, count: Self::Step) -> bool;

    async fn fetch(
        &self,
        source: &dyn SeriesSource,
        path: &KeyPath,
        start: Self::Bound,
        count: Self::Step,
    ) -> Result<Vec<Entry>, CursorError>;
}

/// Wall-clock paging: `Start` is an instant, `Count` a duration
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeDomain;

#[async_trait]
impl WindowDomain for TimeDomain {
    type Bound = DateTime<Utc>;
    type Step = Duration;

    fn name(&self) -> &'static str {
        "time"
    }

    fn end(&self, start: DateTime<Utc>, count: Duration) -> DateTime<Utc> {
        start.checked_add_signed(count).unwrap_or(if count > Duration::zero() {
            DateTime::<Utc>::MAX_UTC
        } else {
            DateTime::<Utc>::MIN_UTC
        })
    }

    fn count_for(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Duration> {
        let count = end.signed_duration_since(start);
        (count > Duration::zero()).then_some(count)
    }

    fn advance(&self, start: DateTime<Utc>, count: Duration) -> Option<DateTime<Utc>> {
        start.checked_add_signed(count)
    }

    fn retreat(&self, start: DateTime<Utc>, count: Duration) -> Option<DateTime<Utc>> {
        start.checked_sub_signed(count)
    }

    fn allows_next(&self, _page_len: usize, _count: Duration) -> bool {
        true
    }

    async fn fetch(
        &self,
        source: &dyn SeriesSource,
        path: &KeyPath,
        start: DateTime<Utc>,
        count: Duration,
    ) -> Result<Vec<Entry>, CursorError> {
        source
            .entries_between(path, start, self.end(start, count))
            .await
    }
}

/// Sequential paging: `Start` is an offset from the oldest entry, `Count`
/// a number of entries (at least one)
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexDomain;

#[async_trait]
impl WindowDomain for IndexDomain {
    type Bound = u64;
    type Step = u64;

    fn name(&self) -> &'static str {
        "index"
    }

    fn normalize(&self, count: u64) -> u64 {
        count.max(1)
    }

    fn end(&self, start: u64, count: u64) -> u64 {
        start.saturating_add(count.max(1) - 1)
    }

    fn count_for(&self, start: u64, end: u64) -> Option<u64> {
        end.checked_sub(start).and_then(|d| d.checked_add(1))
    }

    fn advance(&self, start: u64, count: u64) -> Option<u64> {
        start.checked_add(count)
    }

    fn retreat(&self, start: u64, count: u64) -> Option<u64> {
        (start > 0).then(|| start.saturating_sub(count))
    }

    /// A short page is the tail of the series
    fn allows_next(&self, page_len: usize, count: u64) -> bool {
        page_len as u64 >= count
    }

    async fn fetch(
        &self,
        source: &dyn SeriesSource,
        path: &KeyPath,
        start: u64,
        count: u64,
    ) -> Result<Vec<Entry>, CursorError> {
        source.entries_at(path, start, self.end(start, count)).await
    }
}
