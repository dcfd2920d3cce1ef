//! SQLite backing medium
//!
//! One row per appended envelope, keyed by `(path, seq)` where `seq` is the
//! rowid, so an ordered scan of a path is an index range scan. The payload is
//! the same encoded batch the file backend writes.

use crate::storage::backend::Backend;
use crate::storage::compression::{decode_batch, encode_batch, CompressionType};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::path::KeyPath;
use crate::storage::types::Entry;
use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// SQLite-backed store of entry batches
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    compression: CompressionType,
}

impl SqliteBackend {
    /// Create or open `<data_dir>/series.db`
    pub fn open(data_dir: &Path, compression: CompressionType) -> StorageResult<Self> {
        if !data_dir.exists() {
            tracing::warn!(dir = ?data_dir, "Data directory missing, creating it");
            std::fs::create_dir_all(data_dir)?;
        }
        let path = data_dir.join("series.db");

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            CREATE TABLE IF NOT EXISTS batches (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                payload BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_batches_path ON batches(path, seq);
            ",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            compression,
        })
    }

    /// Database file location
    pub fn db_path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| StorageError::Unavailable(format!("sqlite lock poisoned: {}", e)))?;
            f(&guard)
        })
        .await?
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn append(&self, path: &KeyPath, entries: &[Entry]) -> StorageResult<()> {
        let payload = encode_batch(entries, self.compression)?;
        let path = path.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO batches (path, payload) VALUES (?1, ?2)",
                params![path, payload],
            )?;
            Ok(())
        })
        .await
    }

    async fn load(&self, path: &KeyPath) -> StorageResult<Vec<Entry>> {
        let path = path.to_string();
        let payloads = self
            .with_conn(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT payload FROM batches WHERE path = ?1 ORDER BY seq")?;
                let rows = stmt.query_map(params![path], |row| row.get::<_, Vec<u8>>(0))?;
                let mut payloads = Vec::new();
                for row in rows {
                    payloads.push(row?);
                }
                Ok(payloads)
            })
            .await?;

        let mut entries = Vec::new();
        for payload in payloads {
            entries.extend(decode_batch(&payload)?);
        }
        Ok(entries)
    }

    async fn paths(&self) -> StorageResult<Vec<KeyPath>> {
        let raw = self
            .with_conn(|conn| {
                let mut stmt = conn.prepare("SELECT DISTINCT path FROM batches ORDER BY path")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                let mut paths = Vec::new();
                for row in rows {
                    paths.push(row?);
                }
                Ok(paths)
            })
            .await?;

        let mut paths = Vec::with_capacity(raw.len());
        for path in raw {
            match KeyPath::parse(&path) {
                Ok(parsed) => paths.push(parsed),
                Err(e) => tracing::warn!(path = %path, error = %e, "Skipping unparseable path"),
            }
        }
        Ok(paths)
    }
}
