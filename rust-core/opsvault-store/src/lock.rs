// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Entity Store - Per-entity advisory file locks
//
// Concurrency control in the engine is one advisory lock per entity id,
// taken on the `{entity_id}.lock` file before any mutation. The guard is
// RAII: the lock is released on every exit path, including panics. Lock
// files are left on disk after release; unlinking them would race a
// concurrent acquirer holding the same inode.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Total time a writer will wait for a contended lock before failing
/// with `LockBusy`.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Initial retry backoff; doubled on each attempt up to `MAX_BACKOFF`.
const INITIAL_BACKOFF: Duration = Duration::from_millis(5);
const MAX_BACKOFF: Duration = Duration::from_millis(100);

/// An exclusive advisory lock over one entity's files.
///
/// Holding the guard means this process (and thread) is the single writer
/// for the entity. Dropping it releases the OS lock.
#[derive(Debug)]
pub struct EntityLock {
    file: File,
    path: PathBuf,
}

impl EntityLock {
    /// Acquire the lock for `entity_id` inside `type_dir`, retrying with
    /// bounded backoff until `ACQUIRE_TIMEOUT` elapses.
    pub fn acquire(type_dir: &Path, entity_id: &str) -> StoreResult<Self> {
        let path = type_dir.join(format!("{entity_id}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let start = Instant::now();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(path = %path.display(), "entity lock acquired");
                    return Ok(Self { file, path });
                }
                Err(_) if start.elapsed() < ACQUIRE_TIMEOUT => {
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(_) => {
                    warn!(path = %path.display(), "entity lock acquisition timed out");
                    return Err(StoreError::LockBusy {
                        entity_id: entity_id.to_string(),
                        waited_ms: start.elapsed().as_millis() as u64,
                    });
                }
            }
        }
    }

    /// Path of the underlying lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EntityLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %err, "failed to release entity lock");
        } else {
            debug!(path = %self.path.display(), "entity lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_creates_lock_file() {
        let dir = TempDir::new().unwrap();
        let guard = EntityLock::acquire(dir.path(), "u1").unwrap();
        assert!(guard.path().exists());
    }

    #[test]
    fn test_lock_file_persists_after_release() {
        let dir = TempDir::new().unwrap();
        let path = {
            let guard = EntityLock::acquire(dir.path(), "u1").unwrap();
            guard.path().to_path_buf()
        };
        assert!(path.exists());
    }

    #[test]
    fn test_reacquire_after_drop() {
        let dir = TempDir::new().unwrap();
        drop(EntityLock::acquire(dir.path(), "u1").unwrap());
        // A second acquisition on the same id must succeed immediately.
        let _guard = EntityLock::acquire(dir.path(), "u1").unwrap();
    }

    #[test]
    fn test_distinct_ids_do_not_contend() {
        let dir = TempDir::new().unwrap();
        let _a = EntityLock::acquire(dir.path(), "u1").unwrap();
        let _b = EntityLock::acquire(dir.path(), "u2").unwrap();
    }

    #[test]
    fn test_concurrent_writers_serialize() {
        let dir = TempDir::new().unwrap();
        let dir_path = dir.path().to_path_buf();
        let in_section = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let dir_path = dir_path.clone();
                let in_section = Arc::clone(&in_section);
                let max_seen = Arc::clone(&max_seen);
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        let _guard = EntityLock::acquire(&dir_path, "shared").unwrap();
                        let now = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(1));
                        in_section.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            max_seen.load(Ordering::SeqCst),
            1,
            "two writers entered the critical section concurrently"
        );
    }
}
