//! The paging window over one key

use crate::cursor::domain::{IndexDomain, TimeDomain, WindowDomain};
use crate::cursor::{CursorError, SeriesSource};
use crate::index::Status;
use crate::storage::{Entry, KeyPath};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// Polymorphic paging interface over either domain.
///
/// `reload`, `next` and `previous` take `&mut self`, so one cursor runs at
/// most one of them at a time. Other tasks observe it through a
/// [`CursorHandle`].
#[async_trait]
pub trait Cursor: Send {
    fn path(&self) -> &KeyPath;

    fn status(&self) -> Status;

    /// Last good page
    fn entries(&self) -> &[Entry];

    /// Message of the failure behind an `Error` status
    fn last_error(&self) -> Option<&str>;

    fn handle(&self) -> CursorHandle;

    /// Re-run the query for the current window. Failures are absorbed:
    /// the status becomes `Error` and the previous page stays.
    async fn reload(&mut self) -> Status;

    async fn next(&mut self) -> bool;

    async fn previous(&mut self) -> bool;
}

/// Read-only view of a cursor for other tasks
#[derive(Clone)]
pub struct CursorHandle {
    status: watch::Receiver<Status>,
    entries: Arc<RwLock<Arc<[Entry]>>>,
}

impl CursorHandle {
    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    /// The page as of the last successful reload
    pub fn entries(&self) -> Arc<[Entry]> {
        Arc::clone(&self.entries.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Wait for the next status transition. Returns `None` once the cursor
    /// has been dropped.
    pub async fn changed(&mut self) -> Option<Status> {
        self.status.changed().await.ok()?;
        Some(*self.status.borrow_and_update())
    }
}

/// A `Start`/`Count` window over one key, generic over the bound arithmetic
pub struct Window<D: WindowDomain> {
    domain: D,
    source: Arc<dyn SeriesSource>,
    path: KeyPath,
    start: D::Bound,
    count: D::Step,
    entries: Arc<[Entry]>,
    shared: Arc<RwLock<Arc<[Entry]>>>,
    status: watch::Sender<Status>,
    timeout: Option<Duration>,
    last_error: Option<String>,
}

pub type TimeWindow = Window<TimeDomain>;
pub type IndexWindow = Window<IndexDomain>;

impl<D: WindowDomain + Default> Window<D> {
    pub fn new(
        source: Arc<dyn SeriesSource>,
        path: KeyPath,
        start: D::Bound,
        count: D::Step,
    ) -> Self {
        Self::with_domain(D::default(), source, path, start, count)
    }
}

impl<D: WindowDomain> Window<D> {
    pub fn with_domain(
        domain: D,
        source: Arc<dyn SeriesSource>,
        path: KeyPath,
        start: D::Bound,
        count: D::Step,
    ) -> Self {
        let empty: Arc<[Entry]> = Arc::from(Vec::new());
        let (status, _) = watch::channel(Status::Unknown);
        let count = domain.normalize(count);
        Self {
            domain,
            source,
            path,
            start,
            count,
            entries: Arc::clone(&empty),
            shared: Arc::new(RwLock::new(empty)),
            status,
            timeout: None,
            last_error: None,
        }
    }

    /// Give up on a reload that takes longer than `limit`
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn start(&self) -> D::Bound {
        self.start
    }

    pub fn count(&self) -> D::Step {
        self.count
    }

    pub fn end(&self) -> D::Bound {
        self.domain.end(self.start, self.count)
    }

    pub fn set_start(&mut self, start: D::Bound) {
        self.start = start;
    }

    pub fn set_count(&mut self, count: D::Step) {
        self.count = self.domain.normalize(count);
    }

    /// Request an absolute range by back-solving `Count` from `end`.
    /// Returns false and changes nothing when `end` would leave no room.
    pub fn set_end(&mut self, end: D::Bound) -> bool {
        match self.domain.count_for(self.start, end) {
            Some(count) => {
                self.count = count;
                true
            }
            None => false,
        }
    }

    /// Point the cursor at another key. The current page stays until the
    /// next reload.
    pub fn select(&mut self, path: KeyPath) {
        self.path = path;
    }

    fn set_status(&self, status: Status) {
        self.status.send_replace(status);
    }
}

#[async_trait]
impl<D: WindowDomain> Cursor for Window<D> {
    fn path(&self) -> &KeyPath {
        &self.path
    }

    fn status(&self) -> Status {
        *self.status.borrow()
    }

    fn entries(&self) -> &[Entry] {
        &self.entries
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn handle(&self) -> CursorHandle {
        CursorHandle {
            status: self.status.subscribe(),
            entries: Arc::clone(&self.shared),
        }
    }

    async fn reload(&mut self) -> Status {
        self.set_status(Status::Loading);

        let fetch = self
            .domain
            .fetch(self.source.as_ref(), &self.path, self.start, self.count);
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .unwrap_or(Err(CursorError::Timeout(limit))),
            None => fetch.await,
        };

        match result {
            Ok(entries) => {
                let page: Arc<[Entry]> = Arc::from(entries);
                *self.shared.write().unwrap_or_else(|e| e.into_inner()) = Arc::clone(&page);
                self.entries = page;
                self.last_error = None;
                self.set_status(Status::Idle);
                Status::Idle
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path,
                    domain = self.domain.name(),
                    error = %e,
                    "Cursor reload failed"
                );
                self.last_error = Some(e.to_string());
                self.set_status(Status::Error);
                Status::Error
            }
        }
    }

    async fn next(&mut self) -> bool {
        if !self.domain.allows_next(self.entries.len(), self.count) {
            return false;
        }
        let Some(start) = self.domain.advance(self.start, self.count) else {
            return false;
        };
        self.start = start;
        self.reload().await;
        true
    }

    async fn previous(&mut self) -> bool {
        let Some(start) = self.domain.retreat(self.start, self.count) else {
            return false;
        };
        self.start = start;
        self.reload().await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Envelope, Sample};
    use crate::store::Store;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn path(s: &str) -> KeyPath {
        KeyPath::parse(s).unwrap()
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    async fn store_with(n: i64) -> Arc<Store> {
        let store = Store::in_memory().await.unwrap();
        let samples = (0..n).map(|i| Sample::new("v", i).at(t(i))).collect();
        store
            .write(Envelope {
                path: path("s"),
                entries: samples,
            })
            .await
            .unwrap();
        Arc::new(store)
    }

    /// Source that fails or hangs on demand
    struct Flaky {
        inner: Arc<Store>,
        fail: AtomicBool,
        hang: AtomicBool,
    }

    #[async_trait]
    impl SeriesSource for Flaky {
        async fn entries_between(
            &self,
            path: &KeyPath,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Entry>, CursorError> {
            self.inner.entries_between(path, start, end).await
        }

        async fn entries_at(
            &self,
            path: &KeyPath,
            start: u64,
            end: u64,
        ) -> Result<Vec<Entry>, CursorError> {
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(CursorError::Remote("injected".into()));
            }
            self.inner.entries_at(path, start, end).await
        }
    }

    #[tokio::test]
    async fn test_index_next_stops_after_short_page() {
        let store = store_with(250).await;
        let mut cursor = IndexWindow::new(store, path("s"), 0, 100);
        assert_eq!(cursor.status(), Status::Unknown);

        assert_eq!(cursor.reload().await, Status::Idle);
        assert_eq!(cursor.entries().len(), 100);

        assert!(cursor.next().await);
        assert_eq!(cursor.start(), 100);
        assert_eq!(cursor.entries().len(), 100);

        assert!(cursor.next().await);
        assert_eq!(cursor.start(), 200);
        assert_eq!(cursor.entries().len(), 50);

        assert!(!cursor.next().await);
        assert_eq!(cursor.start(), 200);
    }

    #[tokio::test]
    async fn test_index_previous_clamps_at_zero() {
        let store = store_with(30).await;
        let mut cursor = IndexWindow::new(store, path("s"), 0, 10);

        assert!(!cursor.previous().await);
        assert_eq!(cursor.start(), 0);
        assert_eq!(cursor.status(), Status::Unknown);

        cursor.set_start(5);
        assert!(cursor.previous().await);
        assert_eq!(cursor.start(), 0);
        assert_eq!(cursor.entries().len(), 10);
        assert!(!cursor.previous().await);
    }

    #[tokio::test]
    async fn test_time_paging() {
        let store = store_with(10).await;
        let mut cursor = TimeWindow::new(store, path("s"), t(0), chrono::Duration::seconds(4));

        cursor.reload().await;
        assert_eq!(cursor.entries().len(), 4);

        assert!(cursor.next().await);
        assert_eq!(cursor.start(), t(4));
        assert_eq!(cursor.entries()[0].value.to_string(), "4");

        assert!(cursor.next().await);
        assert_eq!(cursor.entries().len(), 2);

        // time domain keeps walking into empty pages
        assert!(cursor.next().await);
        assert!(cursor.entries().is_empty());

        assert!(cursor.previous().await);
        assert!(cursor.previous().await);
        assert_eq!(cursor.start(), t(4));
    }

    #[tokio::test]
    async fn test_set_end() {
        let store = store_with(10).await;
        let mut index = IndexWindow::new(store.clone(), path("s"), 2, 1);
        assert!(index.set_end(5));
        assert_eq!(index.count(), 4);
        assert_eq!(index.end(), 5);
        index.reload().await;
        assert_eq!(index.entries().len(), 4);
        assert!(!index.set_end(1));
        assert_eq!(index.count(), 4);

        let mut time = TimeWindow::new(store, path("s"), t(2), chrono::Duration::seconds(1));
        assert!(time.set_end(t(5)));
        assert_eq!(time.count(), chrono::Duration::seconds(3));
        time.reload().await;
        assert_eq!(time.entries().len(), 3);
        assert!(!time.set_end(t(2)));
    }

    #[tokio::test]
    async fn test_zero_count_is_clamped() {
        let store = store_with(3).await;
        let mut cursor = IndexWindow::new(store, path("s"), 0, 0);
        assert_eq!(cursor.count(), 1);
        cursor.set_count(0);
        assert_eq!(cursor.count(), 1);
        cursor.reload().await;
        assert_eq!(cursor.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_error_keeps_last_page() {
        let flaky = Arc::new(Flaky {
            inner: store_with(20).await,
            fail: AtomicBool::new(false),
            hang: AtomicBool::new(false),
        });
        let mut cursor = IndexWindow::new(flaky.clone(), path("s"), 0, 10);
        cursor.reload().await;
        assert_eq!(cursor.entries().len(), 10);

        flaky.fail.store(true, Ordering::SeqCst);
        assert!(cursor.next().await);
        assert_eq!(cursor.status(), Status::Error);
        assert_eq!(cursor.entries()[0].value.to_string(), "0");
        assert_eq!(cursor.last_error(), Some("Remote request failed: injected"));

        flaky.fail.store(false, Ordering::SeqCst);
        assert_eq!(cursor.reload().await, Status::Idle);
        assert_eq!(cursor.entries()[0].value.to_string(), "10");
        assert_eq!(cursor.last_error(), None);
    }

    #[tokio::test]
    async fn test_unknown_key_is_error() {
        let store = store_with(1).await;
        let mut cursor = IndexWindow::new(store, path("missing"), 0, 10);
        assert_eq!(cursor.reload().await, Status::Error);
        assert!(cursor.last_error().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_timeout_and_handle() {
        let flaky = Arc::new(Flaky {
            inner: store_with(5).await,
            fail: AtomicBool::new(false),
            hang: AtomicBool::new(false),
        });
        let mut cursor = IndexWindow::new(flaky.clone(), path("s"), 0, 5)
            .with_timeout(Duration::from_millis(50));
        let handle = cursor.handle();

        cursor.reload().await;
        assert_eq!(handle.status(), Status::Idle);
        assert_eq!(handle.entries().len(), 5);

        flaky.hang.store(true, Ordering::SeqCst);
        assert_eq!(cursor.reload().await, Status::Error);
        assert_eq!(handle.status(), Status::Error);
        assert_eq!(handle.entries().len(), 5);
        assert!(cursor.last_error().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_handle_observes_reload() {
        let store = store_with(5).await;
        let mut cursor = IndexWindow::new(store, path("s"), 0, 5);
        let mut handle = cursor.handle();

        let watcher = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(status) = handle.changed().await {
                seen.push(status);
                if status == Status::Idle {
                    break;
                }
            }
            seen
        });

        cursor.reload().await;
        let seen = watcher.await.unwrap();
        assert_eq!(seen.last(), Some(&Status::Idle));
    }

    #[tokio::test]
    async fn test_polymorphic_cursor() {
        let store = store_with(10).await;
        let mut cursors: Vec<Box<dyn Cursor>> = vec![
            Box::new(IndexWindow::new(store.clone(), path("s"), 0, 5)),
            Box::new(TimeWindow::new(store, path("s"), t(0), chrono::Duration::seconds(5))),
        ];
        for cursor in cursors.iter_mut() {
            assert_eq!(cursor.reload().await, Status::Idle);
            assert_eq!(cursor.entries().len(), 5);
            assert!(cursor.next().await);
            assert_eq!(cursor.entries().len(), 5);
        }
    }
}
