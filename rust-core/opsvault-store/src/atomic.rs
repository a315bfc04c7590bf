// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Entity Store - Atomic file I/O primitives
//
// Every durable write in the engine goes through `atomic_write`: the payload
// is written to a temporary file in the target's directory, fsynced, renamed
// over the target, and the directory itself is fsynced. A crash at any point
// leaves either the old file or the new file, never a partial one. Appends
// are expressed as read-modify-write through the same primitive so log files
// inherit the guarantee.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// Write `bytes` to `path` atomically: temp file in the same directory,
/// fsync, rename over the target, fsync the containing directory.
///
/// On any failure the temp file is removed so no partial artifact is left
/// behind.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let dir = path.parent().ok_or_else(|| {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("no parent directory for {}", path.display()),
        ))
    })?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let write_result = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        warn!(path = %path.display(), error = %err, "atomic write failed, removing temp file");
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }

    if let Err(err) = fs::rename(&tmp, path) {
        warn!(path = %path.display(), error = %err, "rename failed, removing temp file");
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }

    fsync_dir(dir)?;
    debug!(path = %path.display(), bytes = bytes.len(), "atomic write complete");
    Ok(())
}

/// Fsync a directory so a completed rename inside it survives a crash.
pub fn fsync_dir(dir: &Path) -> StoreResult<()> {
    let handle = File::open(dir)?;
    handle.sync_all()?;
    Ok(())
}

/// Append one line to a newline-delimited file through the atomic-write
/// primitive. Returns the byte offset at which the new line begins.
///
/// The file is replaced wholesale rather than appended in place, so a crash
/// mid-append can never leave a torn line for readers to trip over.
pub fn append_line(path: &Path, line: &str) -> StoreResult<u64> {
    let mut contents = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(err) => return Err(err.into()),
    };

    let offset = contents.len() as u64;
    contents.extend_from_slice(line.as_bytes());
    contents.push(b'\n');

    atomic_write(path, &contents)?;
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("target.meta");
        atomic_write(&path, b"{\"x\":1}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{\"x\":1}");
    }

    #[test]
    fn test_atomic_write_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("target.meta");
        atomic_write(&path, b"old").unwrap();
        atomic_write(&path, b"new").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("target.log");
        atomic_write(&path, b"payload").unwrap();

        let stray: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(stray.is_empty(), "temp files left behind: {stray:?}");
    }

    #[test]
    fn test_append_line_returns_offsets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entity.log");

        let off1 = append_line(&path, "{\"a\":1}").unwrap();
        let off2 = append_line(&path, "{\"b\":2}").unwrap();

        assert_eq!(off1, 0);
        assert_eq!(off2, 8); // 7 bytes + newline
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{\"a\":1}\n{\"b\":2}\n");
    }

    #[test]
    fn test_append_line_offset_seeks_to_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entity.log");

        append_line(&path, "{\"first\":true}").unwrap();
        let off = append_line(&path, "{\"second\":true}").unwrap();

        let contents = fs::read(&path).unwrap();
        let tail = &contents[off as usize..];
        assert!(tail.starts_with(b"{\"second\":true}"));
    }

    #[test]
    fn test_fsync_dir_on_real_directory() {
        let dir = TempDir::new().unwrap();
        fsync_dir(dir.path()).unwrap();
    }
}
