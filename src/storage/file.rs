//! Append-only per-key log files
//!
//! Every key with data owns one file under `<data_dir>/series/`. The file
//! name is the url-encoded key path plus `.log`. Each appended envelope is a
//! single frame:
//!
//! - length: u32 (4 bytes)
//! - data: [u8; length] (encoded batch, see `compression`)
//! - crc: u32 (4 bytes, CRC32 of length + data)
//!
//! A frame is the unit of recovery: an incomplete trailing frame (a torn
//! length prefix included) or a corrupt last frame is cut off on load, so an
//! envelope is either fully present or absent. A corrupt frame with more
//! data behind it is reported instead of truncated.

use crate::storage::backend::Backend;
use crate::storage::compression::{decode_batch, encode_batch, CompressionType};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::path::KeyPath;
use crate::storage::types::Entry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Frames larger than this are treated as corruption
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const LOG_EXTENSION: &str = "log";

/// Length prefix plus trailing CRC
const FRAME_OVERHEAD: usize = 8;

/// Sync strategy for appends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Fsync after every append (safest, slowest)
    EveryWrite,
    /// Fsync once enough bytes have accumulated
    #[default]
    Batched,
    /// No fsync, rely on OS (fastest, risk of loss on power failure)
    None,
}

/// Options for the file backend
#[derive(Debug, Clone)]
pub struct FileBackendConfig {
    pub data_dir: PathBuf,
    pub sync_mode: SyncMode,
    pub compression: CompressionType,
    /// Bytes appended between fsyncs in `Batched` mode
    pub sync_threshold: usize,
}

impl FileBackendConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            sync_mode: SyncMode::Batched,
            compression: CompressionType::Lz4,
            sync_threshold: 64 * 1024,
        }
    }

    /// Directory holding the per-key logs
    pub fn series_dir(&self) -> PathBuf {
        self.data_dir.join("series")
    }
}

/// Logs written since the last batched fsync
#[derive(Debug, Default)]
struct PendingSync {
    bytes: usize,
    dirty: HashSet<PathBuf>,
}

/// Backend storing one append-only log file per key
pub struct FileBackend {
    config: Arc<FileBackendConfig>,
    pending: Arc<Mutex<PendingSync>>,
}

impl FileBackend {
    /// Open the backend, creating the directory layout when it is missing
    pub fn open(config: FileBackendConfig) -> StorageResult<Self> {
        let series_dir = config.series_dir();
        if !series_dir.exists() {
            tracing::warn!(dir = ?series_dir, "Series directory missing, creating it");
            std::fs::create_dir_all(&series_dir)?;
        }

        Ok(Self {
            config: Arc::new(config),
            pending: Arc::new(Mutex::new(PendingSync::default())),
        })
    }

    fn file_for(series_dir: &Path, path: &KeyPath) -> PathBuf {
        let encoded = urlencoding::encode(&path.to_string()).into_owned();
        series_dir.join(format!("{}.{}", encoded, LOG_EXTENSION))
    }

    fn path_for(file: &Path) -> Option<KeyPath> {
        if file.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
            return None;
        }
        let stem = file.file_stem()?.to_str()?;
        let decoded = urlencoding::decode(stem).ok()?;
        KeyPath::parse(&decoded).ok().filter(|p| !p.is_root())
    }

    fn append_blocking(
        config: &FileBackendConfig,
        pending: &Mutex<PendingSync>,
        path: &KeyPath,
        entries: &[Entry],
    ) -> StorageResult<()> {
        let data = encode_batch(entries, config.compression)?;
        let frame = encode_frame(&data)?;

        let series_dir = config.series_dir();
        if !series_dir.exists() {
            tracing::warn!(dir = ?series_dir, "Series directory vanished, recreating it");
            std::fs::create_dir_all(&series_dir)?;
        }

        let file_path = Self::file_for(&series_dir, path);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;
        let original_len = file.metadata()?.len();

        if let Err(e) = file.write_all(&frame).and_then(|_| file.flush()) {
            // Leave no partial frame behind for the next append to follow
            if let Err(cut) = file.set_len(original_len) {
                tracing::error!(file = ?file_path, error = %cut, "Failed to cut partial frame");
            }
            return Err(e.into());
        }

        match config.sync_mode {
            SyncMode::EveryWrite => file.sync_data()?,
            SyncMode::Batched => {
                let due = {
                    let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
                    pending.bytes += frame.len();
                    pending.dirty.insert(file_path.clone());
                    if pending.bytes >= config.sync_threshold {
                        pending.bytes = 0;
                        std::mem::take(&mut pending.dirty)
                    } else {
                        HashSet::new()
                    }
                };
                if !due.is_empty() {
                    Self::sync_dirty(pending, &file_path, &file, due)?;
                }
            }
            SyncMode::None => {}
        }

        Ok(())
    }

    /// Fsync every log written since the last batched sync. Logs that
    /// could not be synced stay dirty for the next round.
    fn sync_dirty(
        pending: &Mutex<PendingSync>,
        current_path: &Path,
        current: &File,
        due: HashSet<PathBuf>,
    ) -> StorageResult<()> {
        let mut failed = Vec::new();
        let mut first_error = None;
        for dirty in due {
            let result = if dirty == current_path {
                current.sync_data()
            } else {
                match OpenOptions::new().write(true).open(&dirty) {
                    Ok(file) => file.sync_data(),
                    // removed behind our back, nothing left to sync
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e),
                }
            };
            if let Err(e) = result {
                tracing::warn!(file = ?dirty, error = %e, "Batched fsync failed");
                failed.push(dirty);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            None => Ok(()),
            Some(e) => {
                let mut pending = pending.lock().unwrap_or_else(|e| e.into_inner());
                pending.dirty.extend(failed);
                Err(e.into())
            }
        }
    }

    fn load_blocking(config: &FileBackendConfig, path: &KeyPath) -> StorageResult<Vec<Entry>> {
        let file_path = Self::file_for(&config.series_dir(), path);
        if !file_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&file_path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut good_len: u64 = 0;
        let mut frames = 0u64;

        loop {
            match read_frame(&mut reader, file_len - good_len)? {
                Frame::Data(data) => {
                    entries.extend(decode_batch(&data)?);
                    good_len += (data.len() + FRAME_OVERHEAD) as u64;
                    frames += 1;
                }
                Frame::End => break,
                Frame::TornTail(reason) => {
                    tracing::warn!(
                        file = ?file_path,
                        frame = frames,
                        discarded = file_len - good_len,
                        reason = %reason,
                        "Discarding torn tail of series log"
                    );
                    drop(reader);
                    let file = OpenOptions::new().write(true).open(&file_path)?;
                    file.set_len(good_len)?;
                    file.sync_data()?;
                    break;
                }
            }
        }

        Ok(entries)
    }

    fn paths_blocking(config: &FileBackendConfig) -> StorageResult<Vec<KeyPath>> {
        let series_dir = config.series_dir();
        if !series_dir.exists() {
            tracing::warn!(dir = ?series_dir, "Series directory missing");
            return Err(StorageError::Unavailable(format!(
                "series directory {:?} does not exist",
                series_dir
            )));
        }

        let mut paths = Vec::new();
        for dir_entry in std::fs::read_dir(&series_dir)? {
            let file = dir_entry?.path();
            match Self::path_for(&file) {
                Some(path) => paths.push(path),
                None => tracing::debug!(file = ?file, "Ignoring unrecognised file"),
            }
        }
        paths.sort();
        Ok(paths)
    }
}

#[async_trait]
impl Backend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn append(&self, path: &KeyPath, entries: &[Entry]) -> StorageResult<()> {
        let config = Arc::clone(&self.config);
        let pending = Arc::clone(&self.pending);
        let path = path.clone();
        let entries = entries.to_vec();
        tokio::task::spawn_blocking(move || {
            Self::append_blocking(&config, &pending, &path, &entries)
        })
        .await?
    }

    async fn load(&self, path: &KeyPath) -> StorageResult<Vec<Entry>> {
        let config = Arc::clone(&self.config);
        let path = path.clone();
        tokio::task::spawn_blocking(move || Self::load_blocking(&config, &path)).await?
    }

    async fn paths(&self) -> StorageResult<Vec<KeyPath>> {
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || Self::paths_blocking(&config)).await?
    }
}

/// Build `length | data | crc` for one batch
fn encode_frame(data: &[u8]) -> StorageResult<Vec<u8>> {
    if data.len() > MAX_FRAME_LEN {
        return Err(StorageError::Serialization(format!(
            "Envelope too large to persist: {} bytes",
            data.len()
        )));
    }

    let len_bytes = (data.len() as u32).to_le_bytes();
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&len_bytes);
    hasher.update(data);
    let crc = hasher.finalize();

    let mut frame = Vec::with_capacity(data.len() + FRAME_OVERHEAD);
    frame.extend_from_slice(&len_bytes);
    frame.extend_from_slice(data);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Outcome of reading one frame
#[derive(Debug)]
enum Frame {
    Data(Vec<u8>),
    /// Clean end of the log
    End,
    /// The rest of the log is an interrupted or damaged final append
    TornTail(String),
}

/// Read one frame given the number of bytes left in the log. Frames that
/// run past the end of the log are torn; so is a CRC failure on the last
/// frame. A CRC failure with more data behind it is corruption.
fn read_frame<R: Read>(reader: &mut R, remaining: u64) -> StorageResult<Frame> {
    if remaining == 0 {
        return Ok(Frame::End);
    }
    if remaining < 4 {
        return Ok(Frame::TornTail(format!(
            "{} byte(s) of a length prefix",
            remaining
        )));
    }

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let frame_len = (len + FRAME_OVERHEAD) as u64;

    if frame_len > remaining {
        return Ok(Frame::TornTail(format!(
            "frame of {} bytes with only {} left",
            frame_len, remaining
        )));
    }
    if len > MAX_FRAME_LEN {
        return Err(StorageError::Corruption(format!(
            "Frame length too large: {}",
            len
        )));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crc_buf = [0u8; 4];
    reader.read_exact(&mut crc_buf)?;
    let stored_crc = u32::from_le_bytes(crc_buf);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&len_buf);
    hasher.update(&data);
    let computed_crc = hasher.finalize();

    if stored_crc != computed_crc {
        let message = format!(
            "CRC mismatch: stored={}, computed={}",
            stored_crc, computed_crc
        );
        if frame_len == remaining {
            return Ok(Frame::TornTail(message));
        }
        return Err(StorageError::Corruption(message));
    }

    Ok(Frame::Data(data))
}
