//! Batch encoding for persisted entry frames
//!
//! One envelope's entries are encoded as a single block:
//! 1. Intern entry keys (a batch usually repeats a handful of keys)
//! 2. Delta-encode the seconds part of timestamps, keep nanos verbatim
//! 3. Serialize with bincode
//! 4. Optionally LZ4 compress
//!
//! The first byte of an encoded block records the compression used, so a
//! series written under one setting stays readable after it changes.
//! Entry order is preserved exactly: it is the insertion order.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{Entry, Value, ValueType};
use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// Compression applied to encoded blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    #[default]
    Lz4 = 1,
}

impl TryFrom<u8> for CompressionType {
    type Error = StorageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lz4),
            _ => Err(StorageError::Corruption(format!(
                "Unknown compression type: {}",
                value
            ))),
        }
    }
}

/// Intermediate columnar form of a batch
#[derive(Debug, Serialize, Deserialize)]
struct EncodedBlock {
    /// Interned entry keys
    keys: Vec<String>,
    /// Index into `keys` for each entry
    key_refs: Vec<u32>,
    /// Seconds of the first timestamp
    base_secs: i64,
    /// Delta of seconds against the previous entry
    secs_deltas: Vec<i64>,
    /// Sub-second nanoseconds per entry
    nanos: Vec<u32>,
    types: Vec<ValueType>,
    values: Vec<Value>,
}

impl EncodedBlock {
    fn intern(keys: &mut Vec<String>, key: &str) -> u32 {
        if let Some(idx) = keys.iter().position(|existing| existing == key) {
            idx as u32
        } else {
            keys.push(key.to_string());
            (keys.len() - 1) as u32
        }
    }

    fn from_entries(entries: &[Entry]) -> Self {
        let base_secs = entries.first().map(|e| e.timestamp.timestamp()).unwrap_or(0);
        let mut block = EncodedBlock {
            keys: Vec::new(),
            key_refs: Vec::with_capacity(entries.len()),
            base_secs,
            secs_deltas: Vec::with_capacity(entries.len()),
            nanos: Vec::with_capacity(entries.len()),
            types: Vec::with_capacity(entries.len()),
            values: Vec::with_capacity(entries.len()),
        };

        let mut prev_secs = base_secs;
        for entry in entries {
            let secs = entry.timestamp.timestamp();
            let key_ref = Self::intern(&mut block.keys, &entry.key);
            block.key_refs.push(key_ref);
            block.secs_deltas.push(secs - prev_secs);
            block.nanos.push(entry.timestamp.timestamp_subsec_nanos());
            block.types.push(entry.value_type);
            block.values.push(entry.value.clone());
            prev_secs = secs;
        }

        block
    }

    fn into_entries(self) -> StorageResult<Vec<Entry>> {
        let count = self.key_refs.len();
        if self.secs_deltas.len() != count
            || self.nanos.len() != count
            || self.types.len() != count
            || self.values.len() != count
        {
            return Err(StorageError::Corruption(
                "Encoded block columns have mismatched lengths".into(),
            ));
        }

        let mut entries = Vec::with_capacity(count);
        let mut secs = self.base_secs;
        let columns = self
            .key_refs
            .into_iter()
            .zip(self.secs_deltas)
            .zip(self.nanos)
            .zip(self.types)
            .zip(self.values);

        for ((((key_ref, delta), nanos), value_type), value) in columns {
            secs += delta;
            let key = self.keys.get(key_ref as usize).cloned().ok_or_else(|| {
                StorageError::Corruption(format!("Key reference out of range: {}", key_ref))
            })?;
            let timestamp = DateTime::from_timestamp(secs, nanos).ok_or_else(|| {
                StorageError::Corruption(format!("Invalid timestamp: {}s {}ns", secs, nanos))
            })?;
            entries.push(Entry {
                key,
                value,
                value_type,
                timestamp,
            });
        }

        Ok(entries)
    }
}

/// Encode a batch of entries into a self-describing block
pub fn encode_batch(entries: &[Entry], compression: CompressionType) -> StorageResult<Vec<u8>> {
    let serialized = bincode::serialize(&EncodedBlock::from_entries(entries))?;

    let mut out = Vec::with_capacity(serialized.len() + 1);
    out.push(compression as u8);
    match compression {
        CompressionType::None => out.extend_from_slice(&serialized),
        CompressionType::Lz4 => out.extend(lz4_flex::compress_prepend_size(&serialized)),
    }
    Ok(out)
}

/// Decode a block produced by `encode_batch`, in original order
pub fn decode_batch(data: &[u8]) -> StorageResult<Vec<Entry>> {
    let (&tag, body) = data
        .split_first()
        .ok_or_else(|| StorageError::Corruption("Empty block".into()))?;

    let block: EncodedBlock = match CompressionType::try_from(tag)? {
        CompressionType::None => bincode::deserialize(body)?,
        CompressionType::Lz4 => {
            let decompressed = lz4_flex::decompress_size_prepended(body).map_err(|e| {
                StorageError::Compression(format!("LZ4 decompression failed: {}", e))
            })?;
            bincode::deserialize(&decompressed)?
        }
    };

    block.into_entries()
}
