// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Entity Store - Binary offset index
//
// Each entity log `{id}.log` has a sibling `{id}.idx` mapping record
// sequence number to the byte offset of that record's line. The index is a
// derived accelerator: it can be rebuilt at any time by rescanning the log
// and is never the sole source of truth.
//
// On-disk entry format (all integers little-endian):
//   [4 bytes: entry_length (u32)]  -- length of everything after this field
//   [4 bytes: crc32 checksum]      -- CRC32 of all bytes after this field
//   [8 bytes: sequence (u64)]      -- record ordinal within the log (0-based)
//   [8 bytes: offset (u64)]        -- byte offset of the record line
//
// A truncated final entry (crash mid-write) is tolerated and dropped; a CRC
// mismatch on an interior entry is reported as corruption.

use std::fs;
use std::path::Path;

use crc32fast::Hasher as Crc32Hasher;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Bytes after the entry_length field: crc32 + sequence + offset.
const ENTRY_BODY_SIZE: usize = 4 + 8 + 8;

/// Offset index for one entity's log: `offsets[i]` is the byte offset of
/// record `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogIndex {
    offsets: Vec<u64>,
}

impl LogIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an index file. A missing file yields an empty index; a torn
    /// final entry is dropped; interior corruption is an error.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let data = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::new());
            }
            Err(err) => return Err(err.into()),
        };

        let mut offsets = Vec::new();
        let mut pos = 0usize;

        while pos + 4 <= data.len() {
            let entry_len =
                u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;

            if entry_len != ENTRY_BODY_SIZE {
                return Err(StoreError::Corrupted {
                    path: path.display().to_string(),
                    detail: format!("index entry declares {entry_len} bytes, expected {ENTRY_BODY_SIZE}"),
                });
            }

            if pos + 4 + entry_len > data.len() {
                // Torn tail from a crash mid-write. Everything before it is valid.
                warn!(path = %path.display(), offset = pos, "dropping truncated index tail");
                break;
            }

            let body = &data[pos + 4..pos + 4 + entry_len];
            let stored_crc = u32::from_le_bytes(body[0..4].try_into().unwrap());
            let inner = &body[4..];
            let computed_crc = compute_crc32(inner);
            if stored_crc != computed_crc {
                return Err(StoreError::Corrupted {
                    path: path.display().to_string(),
                    detail: format!(
                        "index crc mismatch at byte {pos}: expected {stored_crc:#010x}, got {computed_crc:#010x}"
                    ),
                });
            }

            let sequence = u64::from_le_bytes(inner[0..8].try_into().unwrap());
            let offset = u64::from_le_bytes(inner[8..16].try_into().unwrap());

            if sequence != offsets.len() as u64 {
                return Err(StoreError::Corrupted {
                    path: path.display().to_string(),
                    detail: format!(
                        "index sequence gap: expected {}, found {sequence}",
                        offsets.len()
                    ),
                });
            }

            offsets.push(offset);
            pos += 4 + entry_len;
        }

        Ok(Self { offsets })
    }

    /// Rebuild the index by rescanning the log's line offsets.
    pub fn rebuild_from_log(log_path: &Path) -> StoreResult<Self> {
        let data = match fs::read(log_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::new());
            }
            Err(err) => return Err(err.into()),
        };

        let mut offsets = Vec::new();
        let mut line_start = 0u64;
        for (pos, byte) in data.iter().enumerate() {
            if *byte == b'\n' {
                offsets.push(line_start);
                line_start = pos as u64 + 1;
            }
        }

        debug!(path = %log_path.display(), records = offsets.len(), "rebuilt index from log");
        Ok(Self { offsets })
    }

    /// Append the offset of a newly written record.
    pub fn push(&mut self, offset: u64) {
        self.offsets.push(offset);
    }

    /// Byte offset of record `sequence`, if present.
    pub fn offset_of(&self, sequence: u64) -> Option<u64> {
        self.offsets.get(sequence as usize).copied()
    }

    /// Number of records the index knows about.
    pub fn record_count(&self) -> usize {
        self.offsets.len()
    }

    /// True when the index holds no records.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Serialize the whole index to its on-disk form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.offsets.len() * (4 + ENTRY_BODY_SIZE));
        for (sequence, offset) in self.offsets.iter().enumerate() {
            let mut inner = [0u8; 16];
            inner[0..8].copy_from_slice(&(sequence as u64).to_le_bytes());
            inner[8..16].copy_from_slice(&offset.to_le_bytes());

            let crc = compute_crc32(&inner);

            buffer.extend_from_slice(&(ENTRY_BODY_SIZE as u32).to_le_bytes());
            buffer.extend_from_slice(&crc.to_le_bytes());
            buffer.extend_from_slice(&inner);
        }
        buffer
    }

    /// Persist the index atomically.
    pub fn persist(&self, path: &Path) -> StoreResult<()> {
        crate::atomic::atomic_write(path, &self.to_bytes())
    }
}

/// CRC32 (IEEE polynomial) over a byte slice.
fn compute_crc32(data: &[u8]) -> u32 {
    let mut hasher = Crc32Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let idx = LogIndex::load(&dir.path().join("absent.idx")).unwrap();
        assert!(idx.is_empty());
    }

    #[test]
    fn test_roundtrip_persist_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("u1.idx");

        let mut idx = LogIndex::new();
        idx.push(0);
        idx.push(42);
        idx.push(99);
        idx.persist(&path).unwrap();

        let loaded = LogIndex::load(&path).unwrap();
        assert_eq!(loaded, idx);
        assert_eq!(loaded.offset_of(1), Some(42));
        assert_eq!(loaded.offset_of(3), None);
    }

    #[test]
    fn test_truncated_tail_is_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("u1.idx");

        let mut idx = LogIndex::new();
        idx.push(0);
        idx.push(17);
        let mut bytes = idx.to_bytes();
        // Simulate a crash mid-write of the second entry.
        bytes.truncate(bytes.len() - 5);
        fs::write(&path, &bytes).unwrap();

        let loaded = LogIndex::load(&path).unwrap();
        assert_eq!(loaded.record_count(), 1);
        assert_eq!(loaded.offset_of(0), Some(0));
    }

    #[test]
    fn test_crc_mismatch_is_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("u1.idx");

        let mut idx = LogIndex::new();
        idx.push(7);
        let mut bytes = idx.to_bytes();
        // Flip one bit in the offset field of the first entry.
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        match LogIndex::load(&path) {
            Err(StoreError::Corrupted { detail, .. }) => {
                assert!(detail.contains("crc mismatch"), "detail: {detail}");
            }
            other => panic!("expected Corrupted, got {other:?}"),
        }
    }

    #[test]
    fn test_rebuild_matches_incremental() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("u1.log");

        let mut incremental = LogIndex::new();
        let off1 = crate::atomic::append_line(&log, "{\"a\":1}").unwrap();
        incremental.push(off1);
        let off2 = crate::atomic::append_line(&log, "{\"b\":22}").unwrap();
        incremental.push(off2);
        let off3 = crate::atomic::append_line(&log, "{\"c\":333}").unwrap();
        incremental.push(off3);

        let rebuilt = LogIndex::rebuild_from_log(&log).unwrap();
        assert_eq!(rebuilt, incremental);
    }

    #[test]
    fn test_rebuild_missing_log_is_empty() {
        let dir = TempDir::new().unwrap();
        let idx = LogIndex::rebuild_from_log(&dir.path().join("gone.log")).unwrap();
        assert!(idx.is_empty());
    }
}
