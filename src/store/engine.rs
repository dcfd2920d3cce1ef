//! keyseries Store
//!
//! Orchestrates the write and read paths:
//! - Write: Envelope → validate → reserve node → series write lock →
//!   backend append → in-memory append → status/type → publish → Hub notify
//! - Read: lookup → series read lock (loading it on first touch) → range
//!
//! There is no store-wide lock. Each key's series has its own `RwLock`;
//! the key index takes its exclusive lock only while inserting nodes.
//!
//! The write critical section runs on its own task, so a caller that stops
//! waiting cannot leave an envelope persisted but not installed. Nodes a
//! write creates stay unpublished until its append succeeds.

use crate::events::{LogEvent, LogSink, Severity};
use crate::hub::Hub;
use crate::index::{Key, KeyIndex, KeyNode, Status};
use crate::storage::{Backend, Entry, Envelope, KeyPath, MemoryBackend, Sample, StorageError};
use crate::store::error::{StoreError, StoreResult, WriteError};
use crate::store::series::{Series, SeriesState};
use crate::store::{StoreConfig, StoreStats, WriteReceipt};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLockReadGuard;

/// Builder for [`Store`]
pub struct StoreBuilder {
    backend: Option<Arc<dyn Backend>>,
    hub: Option<Arc<Hub>>,
    observers: Vec<Arc<dyn LogSink>>,
    config: StoreConfig,
    missing_data_dir: Option<PathBuf>,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            hub: None,
            observers: Vec::new(),
            config: StoreConfig::default(),
            missing_data_dir: None,
        }
    }

    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn hub(mut self, hub: Arc<Hub>) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn observer(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.observers.push(sink);
        self
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Data directory the backend lives in. Call before the backend creates
    /// it: a directory missing at this point is reported through the
    /// observers when the store opens.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.missing_data_dir = (!dir.exists()).then_some(dir);
        self
    }

    pub fn data_dir_missing(&self) -> bool {
        self.missing_data_dir.is_some()
    }

    /// Build the store and register every persisted key in the namespace.
    /// Series data itself is loaded lazily.
    pub async fn open(self) -> StoreResult<Store> {
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MemoryBackend::new()) as Arc<dyn Backend>);
        let store = Store {
            index: Arc::new(KeyIndex::new()),
            backend,
            hub: self.hub.unwrap_or_default(),
            observers: Arc::from(self.observers),
            config: self.config,
        };

        if let Some(dir) = &self.missing_data_dir {
            store.emit(
                Severity::Warning,
                format!("Data directory {} missing", dir.display()),
                None,
            );
        }

        let paths = store.backend.paths().await.map_err(|e| {
            store.emit(
                Severity::Error,
                format!("Failed to list persisted keys: {}", e),
                None,
            );
            StoreError::StoreUnavailable(e)
        })?;

        for path in &paths {
            if path.is_root() {
                continue;
            }
            let node = store.index.ensure_path(path);
            node.data().evict().await;
        }

        tracing::info!(
            backend = store.backend.name(),
            keys = paths.len(),
            "Store opened"
        );
        Ok(store)
    }
}

/// The hierarchical time-series store. Clones are handles to the same
/// store.
#[derive(Clone)]
pub struct Store {
    index: Arc<KeyIndex<Series>>,
    backend: Arc<dyn Backend>,
    hub: Arc<Hub>,
    observers: Arc<[Arc<dyn LogSink>]>,
    config: StoreConfig,
}

impl Store {
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// Volatile store over a [`MemoryBackend`]
    pub async fn in_memory() -> StoreResult<Self> {
        StoreBuilder::new().open().await
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Round-trip to the backing medium
    pub async fn check_backend(&self) -> StoreResult<()> {
        self.backend
            .paths()
            .await
            .map(|_| ())
            .map_err(StoreError::StoreUnavailable)
    }

    /// Report a notable condition to `tracing` and every observer
    pub fn emit(&self, severity: Severity, message: impl Into<String>, path: Option<&KeyPath>) {
        let event = LogEvent::new(severity, message, path.cloned());
        let path_field = event.path.as_ref().map(|p| p.to_string()).unwrap_or_default();
        match severity {
            Severity::Information => tracing::info!(path = %path_field, "{}", event.message),
            Severity::Warning => tracing::warn!(path = %path_field, "{}", event.message),
            Severity::Error | Severity::FailureAudit => {
                tracing::error!(path = %path_field, severity = %severity, "{}", event.message)
            }
        }
        for observer in self.observers.iter() {
            observer.on_event(&event);
        }
    }

    // ========================================================================
    // Write path
    // ========================================================================

    /// Apply one envelope. All of its entries become visible to readers and
    /// subscribers together, or none do.
    pub async fn write(&self, envelope: Envelope) -> Result<WriteReceipt, WriteError> {
        let Envelope { path, entries } = envelope;
        self.write_samples(&path, entries).await
    }

    pub async fn write_samples(
        &self,
        path: &KeyPath,
        samples: Vec<Sample>,
    ) -> Result<WriteReceipt, WriteError> {
        if path.is_root() {
            return Err(WriteError::InvalidPath(
                "cannot write to the namespace root".into(),
            ));
        }

        let submitted = samples.len();
        let entries = match self.validate(path, samples) {
            Ok(entries) => entries,
            Err(e) => {
                if let Some(node) = self.index.lookup(path) {
                    node.set_status(Status::Error);
                }
                self.emit(Severity::Error, format!("Write rejected: {}", e), Some(path));
                return Err(e);
            }
        };
        let dropped = submitted - entries.len();

        if entries.is_empty() {
            return Ok(WriteReceipt {
                path: path.clone(),
                written: 0,
                dropped,
            });
        }

        let store = self.clone();
        let path = path.clone();
        tokio::spawn(async move { store.commit(&path, entries, dropped).await })
            .await
            .map_err(|e| WriteError::StoreUnavailable(e.into()))?
    }

    /// Lock, persist, install, publish and notify
    async fn commit(
        &self,
        path: &KeyPath,
        entries: Vec<Entry>,
        dropped: usize,
    ) -> Result<WriteReceipt, WriteError> {
        let node = self.index.reserve_path(path);
        let series = node.data();
        let mut state = series.state.write().await;

        if !state.is_resident() {
            if let Err(e) = self.load_into(&node, &mut state).await {
                self.emit(
                    Severity::Error,
                    format!("Write failed, series could not be loaded: {}", e),
                    Some(path),
                );
                return Err(WriteError::StoreUnavailable(e));
            }
        }

        if let Err(e) = self.backend.append(path, &entries).await {
            // a node this write reserved stays hidden; only known keys go to Error
            if node.is_published() {
                node.set_status(Status::Error);
            }
            self.emit(Severity::Error, format!("Write failed: {}", e), Some(path));
            return Err(WriteError::StoreUnavailable(e));
        }

        state.append(&entries);
        node.set_status(Status::Idle);
        if let Some(last) = entries.last() {
            node.set_value_type(last.value_type);
        }
        self.index.publish(path);

        // under the series lock so per-path notifications follow append order
        self.hub.notify(path, &entries);
        drop(state);

        tracing::debug!(path = %path, entries = entries.len(), dropped, "Envelope written");
        Ok(WriteReceipt {
            path: path.clone(),
            written: entries.len(),
            dropped,
        })
    }

    fn validate(&self, path: &KeyPath, samples: Vec<Sample>) -> Result<Vec<Entry>, WriteError> {
        let now = Utc::now();
        let mut entries = Vec::with_capacity(samples.len());
        for (index, sample) in samples.into_iter().enumerate() {
            match sample.into_entry(now) {
                Ok(entry) => entries.push(entry),
                Err(rejected) => {
                    let actual = rejected.value.value_type();
                    let error = WriteError::TypeMismatch {
                        index,
                        key: rejected.key,
                        expected: rejected.value_type.unwrap_or(actual),
                        actual,
                    };
                    if self.config.atomic_envelopes {
                        return Err(error);
                    }
                    self.emit(
                        Severity::Warning,
                        format!("Dropped sample: {}", error),
                        Some(path),
                    );
                }
            }
        }
        Ok(entries)
    }

    // ========================================================================
    // Read path
    // ========================================================================

    /// Entries with `start <= timestamp < end`, oldest first
    pub async fn get_time(
        &self,
        path: &KeyPath,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Entry>> {
        let node = self.node(path)?;
        let state = self.read_series(&node).await?;
        Ok(state.time_range(start, end).to_vec())
    }

    /// Entries at positions `start..=end` counted from the oldest (0).
    /// `end` past the tail is truncated.
    pub async fn get_index(&self, path: &KeyPath, start: u64, end: u64) -> StoreResult<Vec<Entry>> {
        let node = self.node(path)?;
        let state = self.read_series(&node).await?;
        Ok(state.index_range(start, end).to_vec())
    }

    /// Number of entries stored under `path`
    pub async fn len(&self, path: &KeyPath) -> StoreResult<usize> {
        let node = self.node(path)?;
        let state = self.read_series(&node).await?;
        Ok(state.len())
    }

    /// Direct children of `path`; the root is the empty path
    pub fn get_keys(&self, path: &KeyPath) -> StoreResult<Vec<Key>> {
        self.index
            .child_keys(path)
            .ok_or_else(|| StoreError::NotFound(path.clone()))
    }

    pub fn lookup(&self, path: &KeyPath) -> StoreResult<Key> {
        self.index
            .key(path)
            .ok_or_else(|| StoreError::NotFound(path.clone()))
    }

    pub async fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            backend: self.backend.name().to_string(),
            keys: self.index.len().saturating_sub(1),
            ..Default::default()
        };
        for node in self.index.nodes() {
            let state = node.data().state.read().await;
            if !state.is_resident() {
                continue;
            }
            if state.len() > 0 {
                stats.resident_series += 1;
            }
            stats.entries += state.len();
        }
        stats
    }

    fn node(&self, path: &KeyPath) -> StoreResult<Arc<KeyNode<Series>>> {
        self.index
            .lookup(path)
            .ok_or_else(|| StoreError::NotFound(path.clone()))
    }

    /// Shared access to a series, loading it from the backend first if it
    /// is not resident yet
    async fn read_series<'a>(
        &self,
        node: &'a KeyNode<Series>,
    ) -> StoreResult<RwLockReadGuard<'a, SeriesState>> {
        let series = node.data();
        {
            let state = series.state.read().await;
            if state.is_resident() {
                return Ok(state);
            }
        }

        let mut state = series.state.write().await;
        if !state.is_resident() {
            if let Err(e) = self.load_into(node, &mut state).await {
                self.emit(
                    Severity::Error,
                    format!("Failed to load series: {}", e),
                    Some(node.path()),
                );
                return Err(StoreError::StoreUnavailable(e));
            }
        }
        Ok(state.downgrade())
    }

    async fn load_into(
        &self,
        node: &KeyNode<Series>,
        state: &mut SeriesState,
    ) -> Result<(), StorageError> {
        let loading = LoadingStatus::enter(node);
        match self.backend.load(node.path()).await {
            Ok(loaded) => {
                if let Some(last) = loaded.last() {
                    node.set_value_type(last.value_type);
                }
                tracing::debug!(path = %node.path(), entries = loaded.len(), "Series loaded");
                state.install(loaded);
                loading.finish(Status::Idle);
                Ok(())
            }
            Err(e) => {
                loading.finish(Status::Error);
                Err(e)
            }
        }
    }
}

/// `Loading` for the duration of a load. Dropped without `finish`, it puts
/// back the status the node had before.
struct LoadingStatus<'a> {
    node: &'a KeyNode<Series>,
    prior: Status,
    done: bool,
}

impl<'a> LoadingStatus<'a> {
    fn enter(node: &'a KeyNode<Series>) -> Self {
        let prior = node.status();
        node.set_status(Status::Loading);
        Self {
            node,
            prior,
            done: false,
        }
    }

    fn finish(mut self, status: Status) {
        self.node.set_status(status);
        self.done = true;
    }
}

impl Drop for LoadingStatus<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.node.set_status(self.prior);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::SubscriptionPattern;
    use crate::storage::{FileBackend, FileBackendConfig, StorageResult, Value, ValueType};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;
    use tempfile::tempdir;
    use tokio::time::{sleep, timeout};

    /// Memory medium that stalls after committing an append and before
    /// answering a load
    struct SlowBackend {
        inner: MemoryBackend,
        delay: std::time::Duration,
    }

    impl SlowBackend {
        fn new(delay_ms: u64) -> Self {
            Self {
                inner: MemoryBackend::new(),
                delay: std::time::Duration::from_millis(delay_ms),
            }
        }
    }

    #[async_trait]
    impl Backend for SlowBackend {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn append(&self, path: &KeyPath, entries: &[Entry]) -> StorageResult<()> {
            self.inner.append(path, entries).await?;
            sleep(self.delay).await;
            Ok(())
        }

        async fn load(&self, path: &KeyPath) -> StorageResult<Vec<Entry>> {
            sleep(self.delay).await;
            self.inner.load(path).await
        }

        async fn paths(&self) -> StorageResult<Vec<KeyPath>> {
            self.inner.paths().await
        }
    }

    fn path(s: &str) -> KeyPath {
        KeyPath::parse(s).unwrap()
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    async fn open_file_store(dir: &std::path::Path) -> Store {
        let backend = FileBackend::open(FileBackendConfig::new(dir)).unwrap();
        Store::builder()
            .backend(Arc::new(backend))
            .open()
            .await
            .unwrap()
    }

    fn envelope(p: &str, samples: Vec<Sample>) -> Envelope {
        Envelope {
            path: path(p),
            entries: samples,
        }
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let store = Store::in_memory().await.unwrap();
        store
            .write(envelope(
                "plant.boiler.temp",
                vec![
                    Sample::new("temp", 20.5).at(t(0)),
                    Sample::new("temp", 21.0).at(t(1)),
                ],
            ))
            .await
            .unwrap();

        let got = store
            .get_time(&path("plant.boiler.temp"), t(0), t(2))
            .await
            .unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].value, Value::Float(20.5));

        let key = store.lookup(&path("plant.boiler.temp")).unwrap();
        assert_eq!(key.status, Status::Idle);
        assert_eq!(key.value_type, Some(ValueType::Float));

        let folder = store.lookup(&path("plant.boiler")).unwrap();
        assert_eq!(folder.value_type, None);
        assert_eq!(folder.children, vec![path("plant.boiler.temp")]);
    }

    #[tokio::test]
    async fn test_timestamp_assigned_when_absent() {
        let store = Store::in_memory().await.unwrap();
        let before = Utc::now();
        store
            .write(envelope("k", vec![Sample::new("v", "x")]))
            .await
            .unwrap();
        let after = Utc::now();

        let got = store.get_index(&path("k"), 0, 0).await.unwrap();
        assert!(got[0].timestamp >= before && got[0].timestamp <= after);
    }

    #[tokio::test]
    async fn test_not_found_vs_empty() {
        let store = Store::in_memory().await.unwrap();
        store
            .write(envelope("a.b", vec![Sample::new("v", 1i64).at(t(0))]))
            .await
            .unwrap();

        assert!(matches!(
            store.get_time(&path("a.c"), t(0), t(1)).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(store.get_keys(&path("zz")), Err(StoreError::NotFound(_))));

        // exists, nothing in range
        assert!(store.get_time(&path("a.b"), t(5), t(9)).await.unwrap().is_empty());
        // folder without data
        assert!(store.get_index(&path("a"), 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_atomic_type_mismatch() {
        let store = Store::in_memory().await.unwrap();
        let result = store
            .write(envelope(
                "k",
                vec![
                    Sample::new("ok", 1i64),
                    Sample::new("bad", "text").typed(ValueType::Integer),
                ],
            ))
            .await;

        match result {
            Err(WriteError::TypeMismatch {
                index,
                key,
                expected,
                actual,
            }) => {
                assert_eq!(index, 1);
                assert_eq!(key, "bad");
                assert_eq!(expected, ValueType::Integer);
                assert_eq!(actual, ValueType::String);
            }
            other => panic!("unexpected: {:?}", other),
        }
        // nothing applied, not even the namespace node
        assert!(store.lookup(&path("k")).is_err());
    }

    #[tokio::test]
    async fn test_non_atomic_drops_bad_samples() {
        let store = Store::builder()
            .config(StoreConfig {
                atomic_envelopes: false,
            })
            .open()
            .await
            .unwrap();
        let receipt = store
            .write(envelope(
                "k",
                vec![
                    Sample::new("ok", 1i64),
                    Sample::new("bad", "text").typed(ValueType::Integer),
                    Sample::new("ok2", 2.0).typed(ValueType::Integer),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(receipt.written, 2);
        assert_eq!(receipt.dropped, 1);

        let got = store.get_index(&path("k"), 0, 10).await.unwrap();
        assert_eq!(got[1].value, Value::Int(2));
    }

    #[tokio::test]
    async fn test_root_write_rejected() {
        let store = Store::in_memory().await.unwrap();
        let result = store
            .write(envelope("", vec![Sample::new("v", 1i64)]))
            .await;
        assert!(matches!(result, Err(WriteError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_empty_envelope_is_noop() {
        let store = Store::in_memory().await.unwrap();
        let (id, mut rx) = store.hub().connect_channel().unwrap();
        store.hub().register(&id, SubscriptionPattern::All).unwrap();

        let receipt = store.write(envelope("k", vec![])).await.unwrap();
        assert_eq!(receipt.written, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_backend_failure_leaves_no_trace() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Store::builder()
            .backend(backend.clone())
            .open()
            .await
            .unwrap();
        let (id, mut rx) = store.hub().connect_channel().unwrap();
        store.hub().register(&id, path("k")).unwrap();

        store
            .write(envelope("k", vec![Sample::new("v", 1i64).at(t(0))]))
            .await
            .unwrap();
        rx.recv().await.unwrap();

        backend.set_available(false);
        let err = store
            .write(envelope("k", vec![Sample::new("v", 2i64).at(t(1))]))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.lookup(&path("k")).unwrap().status, Status::Error);
        assert!(rx.try_recv().is_err());

        backend.set_available(true);
        let got = store.get_index(&path("k"), 0, 10).await.unwrap();
        assert_eq!(got.len(), 1);

        store
            .write(envelope("k", vec![Sample::new("v", 3i64).at(t(2))]))
            .await
            .unwrap();
        assert_eq!(store.lookup(&path("k")).unwrap().status, Status::Idle);
        assert_eq!(store.len(&path("k")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_lazy_load_from_file_backend() {
        let dir = tempdir().unwrap();

        {
            let store = open_file_store(dir.path()).await;
            store
                .write(envelope(
                    "site.a",
                    vec![
                        Sample::new("v", 2i64).at(t(2)),
                        Sample::new("v", 1i64).at(t(1)),
                    ],
                ))
                .await
                .unwrap();
        }

        let store = open_file_store(dir.path()).await;
        let key = store.lookup(&path("site.a")).unwrap();
        assert_eq!(key.status, Status::Unknown);
        assert_eq!(store.stats().await.resident_series, 0);

        let got = store.get_time(&path("site.a"), t(0), t(10)).await.unwrap();
        let values: Vec<&Value> = got.iter().map(|e| &e.value).collect();
        assert_eq!(values, vec![&Value::Int(1), &Value::Int(2)]);

        let key = store.lookup(&path("site.a")).unwrap();
        assert_eq!(key.status, Status::Idle);
        assert_eq!(key.value_type, Some(ValueType::Integer));

        let stats = store.stats().await;
        assert_eq!(stats.backend, "file");
        assert_eq!(stats.keys, 2);
        assert_eq!(stats.resident_series, 1);
        assert_eq!(stats.entries, 2);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .append(&path("k"), &[Entry::new("v", 1i64, t(0))])
            .await
            .unwrap();
        let store = Store::builder()
            .backend(backend.clone())
            .open()
            .await
            .unwrap();

        backend.set_available(false);
        assert!(matches!(
            store.get_index(&path("k"), 0, 0).await,
            Err(StoreError::StoreUnavailable(_))
        ));
        assert_eq!(store.lookup(&path("k")).unwrap().status, Status::Error);

        backend.set_available(true);
        assert_eq!(store.get_index(&path("k"), 0, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_observers_receive_events() {
        let seen: Arc<Mutex<Vec<LogEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let backend = Arc::new(MemoryBackend::new());
        let store = Store::builder()
            .backend(backend.clone())
            .observer(Arc::new(move |e: &LogEvent| {
                captured.lock().unwrap().push(e.clone())
            }))
            .open()
            .await
            .unwrap();

        backend.set_available(false);
        let _ = store
            .write(envelope("k", vec![Sample::new("v", 1i64)]))
            .await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].severity, Severity::Error);
        assert_eq!(seen[0].path, Some(path("k")));
    }

    #[tokio::test]
    async fn test_missing_data_dir_is_reported() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("not-yet");
        let seen: Arc<Mutex<Vec<Severity>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);

        let builder = Store::builder()
            .data_dir(&data_dir)
            .observer(Arc::new(move |e: &LogEvent| {
                captured.lock().unwrap().push(e.severity)
            }));
        assert!(builder.data_dir_missing());
        builder.open().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![Severity::Warning]);
    }

    #[tokio::test]
    async fn test_same_timestamp_keeps_arrival_order() {
        let store = Store::in_memory().await.unwrap();
        for i in 0..3i64 {
            store
                .write(envelope("k", vec![Sample::new(format!("w{}", i), i).at(t(0))]))
                .await
                .unwrap();
        }
        let got = store
            .get_time(&path("k"), t(0), t(0) + Duration::seconds(1))
            .await
            .unwrap();
        let keys: Vec<&str> = got.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["w0", "w1", "w2"]);
    }

    #[tokio::test]
    async fn test_abandoned_write_still_lands() {
        let backend = Arc::new(SlowBackend::new(100));
        let store = Store::builder()
            .backend(backend.clone())
            .open()
            .await
            .unwrap();
        let (id, mut rx) = store.hub().connect_channel().unwrap();
        store.hub().register(&id, path("k")).unwrap();

        let abandoned = timeout(
            std::time::Duration::from_millis(10),
            store.write_samples(&path("k"), vec![Sample::new("v", 1i64).at(t(0))]),
        )
        .await;
        assert!(abandoned.is_err());

        sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(backend.inner.load(&path("k")).await.unwrap().len(), 1);
        assert_eq!(store.get_index(&path("k"), 0, 10).await.unwrap().len(), 1);
        assert_eq!(store.lookup(&path("k")).unwrap().status, Status::Idle);
        assert_eq!(rx.try_recv().unwrap().entries.len(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_load_restores_status() {
        let backend = Arc::new(SlowBackend::new(100));
        backend
            .inner
            .append(&path("k"), &[Entry::new("v", 1i64, t(0))])
            .await
            .unwrap();
        let store = Store::builder()
            .backend(backend.clone())
            .open()
            .await
            .unwrap();
        assert_eq!(store.lookup(&path("k")).unwrap().status, Status::Unknown);

        let abandoned = timeout(
            std::time::Duration::from_millis(10),
            store.get_index(&path("k"), 0, 10),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(store.lookup(&path("k")).unwrap().status, Status::Unknown);

        sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(store.lookup(&path("k")).unwrap().status, Status::Unknown);
        assert_eq!(store.stats().await.resident_series, 0);

        assert_eq!(store.get_index(&path("k"), 0, 10).await.unwrap().len(), 1);
        assert_eq!(store.lookup(&path("k")).unwrap().status, Status::Idle);
    }

    #[tokio::test]
    async fn test_failed_write_to_new_path_creates_no_nodes() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Store::builder()
            .backend(backend.clone())
            .open()
            .await
            .unwrap();
        store
            .write(envelope("a.x", vec![Sample::new("v", 1i64).at(t(0))]))
            .await
            .unwrap();

        backend.set_available(false);
        assert!(store
            .write(envelope("typo.a.b", vec![Sample::new("v", 1i64)]))
            .await
            .is_err());
        assert!(store
            .write(envelope("a.y.z", vec![Sample::new("v", 1i64)]))
            .await
            .is_err());

        assert!(matches!(store.lookup(&path("typo")), Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.get_index(&path("typo.a.b"), 0, 10).await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.lookup(&path("a")).unwrap().children, vec![path("a.x")]);
        assert_eq!(store.get_keys(&KeyPath::root()).unwrap().len(), 1);
        assert_eq!(store.stats().await.keys, 2);

        // the same path succeeds once the medium is back
        backend.set_available(true);
        store
            .write(envelope("typo.a.b", vec![Sample::new("v", 2i64)]))
            .await
            .unwrap();
        assert_eq!(store.lookup(&path("typo.a.b")).unwrap().status, Status::Idle);
        assert_eq!(store.get_keys(&KeyPath::root()).unwrap().len(), 2);
    }
}
