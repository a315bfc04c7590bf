// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Secure Wiper
//
// Forensic-resistant deletion for a spinning-disk volume. A wipe is not a
// rename: the file's full length is overwritten twice (cryptographically
// random bytes, then zeros), with an fsync and a SHA-256 digest taken after
// each pass, before the file is unlinked and its parent directory fsynced.
// The three digests are the proof — `verified` holds only when they are
// pairwise distinct, i.e. the content was genuinely replaced twice.
//
// Every wipe attempt, including skips and failures, appends one record to
// an append-only proof log. Audit completeness matters more than
// suppressing noise.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use opsvault_store::atomic::{append_line, fsync_dir};

/// Overwrite and hash pass chunk size.
const PASS_CHUNK_SIZE: usize = 64 * 1024;

/// File extensions making up one entity's on-disk footprint.
const ENTITY_EXTENSIONS: [&str; 4] = ["log", "idx", "meta", "lock"];

/// Errors that can occur during secure erasure.
#[derive(Debug, Error)]
pub enum WipeError {
    /// An I/O error occurred during an overwrite pass, unlink, or fsync.
    #[error("wipe I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A shared durability primitive (atomic append, directory fsync)
    /// failed.
    #[error("wipe store primitive error: {0}")]
    Store(#[from] opsvault_store::StoreError),

    /// The proof log record could not be serialized.
    #[error("wipe proof log error: {0}")]
    ProofLog(String),
}

/// Convenience type alias for wiper results.
pub type WipeResult<T> = Result<T, WipeError>;

// ---------------------------------------------------------------------------
// Proof records
// ---------------------------------------------------------------------------

/// Cryptographic evidence that one file's bytes were overwritten before
/// removal. Immutable once logged; never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WipeProof {
    pub timestamp: DateTime<Utc>,
    pub path: String,
    pub size: u64,
    pub hash_before: String,
    pub hash_after_random: String,
    pub hash_after_zero: String,
    pub verified: bool,
}

/// One line of the append-only wipe log. Skips and failures are recorded
/// with the same fidelity as successful wipes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WipeLogEntry {
    Wiped(WipeProof),
    Skipped {
        timestamp: DateTime<Utc>,
        path: String,
    },
    Failed {
        timestamp: DateTime<Utc>,
        path: String,
        error: String,
    },
}

/// Result of one `secure_wipe` call. A missing file is a skip, not an
/// error: the caller asked for absence and absence already holds.
#[derive(Debug, Clone, PartialEq)]
pub enum WipeOutcome {
    Wiped(WipeProof),
    Skipped,
}

impl WipeOutcome {
    /// True when the file was wiped and its three digests were pairwise
    /// distinct.
    pub fn verified(&self) -> bool {
        matches!(self, WipeOutcome::Wiped(proof) if proof.verified)
    }
}

/// Per-file outcome inside an entity wipe, with failures captured instead
/// of aborting the remaining files.
#[derive(Debug, Clone, PartialEq)]
pub enum FileWipeOutcome {
    Wiped(WipeProof),
    Skipped,
    Failed(String),
}

/// Summary of wiping one entity's full on-disk footprint.
#[derive(Debug, Clone)]
pub struct EntityWipeReport {
    pub entity_id: String,
    pub files: Vec<(String, FileWipeOutcome)>,
    /// True only when every file that existed was wiped and individually
    /// verified.
    pub all_verified: bool,
}

// ---------------------------------------------------------------------------
// SecureWiper
// ---------------------------------------------------------------------------

/// The secure erasure engine. Owns the append-only wipe-proof log.
#[derive(Debug)]
pub struct SecureWiper {
    proof_log: PathBuf,
}

impl SecureWiper {
    /// Create a wiper logging proofs to `proof_log` (conventionally
    /// `{root}/audit/wipe_log.log`).
    pub fn new(proof_log: impl Into<PathBuf>) -> Self {
        Self {
            proof_log: proof_log.into(),
        }
    }

    /// Path of the wipe-proof log.
    pub fn proof_log_path(&self) -> &Path {
        &self.proof_log
    }

    /// Securely erase one file: hash, random-overwrite, hash, zero-
    /// overwrite, hash, unlink, fsync parent. Returns `Skipped` when the
    /// file is already absent. The attempt is logged regardless of outcome.
    pub fn secure_wipe(&self, path: &Path) -> WipeResult<WipeOutcome> {
        if !path.exists() {
            self.log_entry(&WipeLogEntry::Skipped {
                timestamp: Utc::now(),
                path: path.display().to_string(),
            })?;
            return Ok(WipeOutcome::Skipped);
        }

        match self.wipe_passes(path) {
            Ok(proof) => {
                info!(
                    path = %path.display(),
                    size = proof.size,
                    verified = proof.verified,
                    "file securely wiped"
                );
                self.log_entry(&WipeLogEntry::Wiped(proof.clone()))?;
                Ok(WipeOutcome::Wiped(proof))
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "secure wipe failed");
                self.log_entry(&WipeLogEntry::Failed {
                    timestamp: Utc::now(),
                    path: path.display().to_string(),
                    error: err.to_string(),
                })?;
                Err(err)
            }
        }
    }

    /// Wipe the fixed set of per-entity files (`.log`, `.idx`, `.meta`,
    /// `.lock`). A failure on one file does not abort the others.
    pub fn secure_wipe_entity(
        &self,
        entity_dir: &Path,
        entity_id: &str,
    ) -> WipeResult<EntityWipeReport> {
        let mut files = Vec::with_capacity(ENTITY_EXTENSIONS.len());
        let mut all_verified = true;

        for ext in ENTITY_EXTENSIONS {
            let file_name = format!("{entity_id}.{ext}");
            let path = entity_dir.join(&file_name);
            let outcome = match self.secure_wipe(&path) {
                Ok(WipeOutcome::Wiped(proof)) => {
                    if !proof.verified {
                        all_verified = false;
                    }
                    FileWipeOutcome::Wiped(proof)
                }
                Ok(WipeOutcome::Skipped) => FileWipeOutcome::Skipped,
                Err(err) => {
                    all_verified = false;
                    FileWipeOutcome::Failed(err.to_string())
                }
            };
            files.push((file_name, outcome));
        }

        info!(entity_id, all_verified, "entity wipe complete");
        Ok(EntityWipeReport {
            entity_id: entity_id.to_string(),
            files,
            all_verified,
        })
    }

    /// Confirm a previously wiped file is absent.
    pub fn verify_wipe(&self, path: &Path) -> bool {
        !path.exists()
    }

    /// Read back every proof-log record, oldest first.
    pub fn read_proofs(&self) -> WipeResult<Vec<WipeLogEntry>> {
        let contents = match fs::read_to_string(&self.proof_log) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut entries = Vec::new();
        for line in contents.lines().filter(|l| !l.is_empty()) {
            let entry = serde_json::from_str(line)
                .map_err(|err| WipeError::ProofLog(format!("bad proof record: {err}")))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// The destructive passes: hash, random pass, hash, zero pass, hash,
    /// unlink, parent fsync.
    fn wipe_passes(&self, path: &Path) -> WipeResult<WipeProof> {
        let size = fs::metadata(path)?.len();
        let hash_before = hash_file(path)?;

        overwrite_file(path, size, PassPattern::Random)?;
        let hash_after_random = hash_file(path)?;

        overwrite_file(path, size, PassPattern::Zero)?;
        let hash_after_zero = hash_file(path)?;

        fs::remove_file(path)?;
        if let Some(parent) = path.parent() {
            fsync_dir(parent)?;
        }

        // A zero-length file has no content to recover; unlinking it is
        // already complete erasure. For anything else the three digests
        // must be pairwise distinct.
        let verified = size == 0
            || (hash_after_random != hash_before
                && hash_after_zero != hash_before
                && hash_after_zero != hash_after_random);

        Ok(WipeProof {
            timestamp: Utc::now(),
            path: path.display().to_string(),
            size,
            hash_before,
            hash_after_random,
            hash_after_zero,
            verified,
        })
    }

    /// Append one record to the proof log. Unconditional: called on every
    /// outcome.
    fn log_entry(&self, entry: &WipeLogEntry) -> WipeResult<()> {
        let line = serde_json::to_string(entry)
            .map_err(|err| WipeError::ProofLog(err.to_string()))?;
        append_line(&self.proof_log, &line)?;
        Ok(())
    }
}

/// Overwrite pass fill pattern.
enum PassPattern {
    Random,
    Zero,
}

/// Overwrite the first `size` bytes of `path` in place, chunk by chunk,
/// then fsync. The file is opened without truncation so the original
/// length is preserved for the pass.
fn overwrite_file(path: &Path, size: u64, pattern: PassPattern) -> WipeResult<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(0))?;

    let mut chunk = vec![0u8; PASS_CHUNK_SIZE];
    let mut remaining = size;
    while remaining > 0 {
        let len = remaining.min(PASS_CHUNK_SIZE as u64) as usize;
        match pattern {
            PassPattern::Random => OsRng.fill_bytes(&mut chunk[..len]),
            PassPattern::Zero => chunk[..len].fill(0),
        }
        file.write_all(&chunk[..len])?;
        remaining -= len as u64;
    }

    file.sync_all()?;
    Ok(())
}

/// Streaming SHA-256 of a file's contents, hex-encoded.
fn hash_file(path: &Path) -> WipeResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut chunk = vec![0u8; PASS_CHUNK_SIZE];
    loop {
        let read = file.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
