// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Video Streamer - Hardened media storage and range serving
//
// A specialized read/write path over `{root}/videos/{user}/{session}/
// {filename}`. Identifiers are validated against a fixed character set
// before they touch a path, filenames are sanitized, and every resolved
// path is re-checked for containment within the video root after
// canonicalization — traversal and symlink escapes fail even if an
// upstream check was bypassed. Delivery is chunked so memory stays bounded
// regardless of file size, and a concurrent-stream cap is enforced as a
// structured outcome rather than an error.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use opsvault_store::atomic::atomic_write;

use crate::error::{StreamError, StreamResult};
use crate::token::{sign_token, verify_token, TokenClaims};

/// Minimum signing secret length; the subsystem refuses to construct with
/// less.
pub const MIN_SECRET_LEN: usize = 32;

/// Default maximum stored payload: 500 MiB.
pub const DEFAULT_MAX_PAYLOAD: u64 = 500 * 1024 * 1024;

/// Default concurrent-stream cap.
pub const DEFAULT_MAX_STREAMS: usize = 16;

/// Fixed chunk size for range delivery.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Longest accepted user/session id.
const MAX_SEGMENT_LEN: usize = 64;

/// Longest accepted (sanitized) filename.
const MAX_FILENAME_LEN: usize = 128;

/// Outcome of a `stream` call. Hitting the concurrency cap is a normal,
/// expected response, not an exceptional failure.
#[derive(Debug)]
pub enum StreamOutcome {
    Stream(VideoStream),
    TooManyStreams { active: usize, max: usize },
}

/// The security-hardened video subsystem.
#[derive(Debug)]
pub struct VideoStreamer {
    video_root: PathBuf,
    secret: Vec<u8>,
    max_payload: u64,
    max_streams: usize,
    active: Arc<AtomicUsize>,
}

impl VideoStreamer {
    /// Construct over `video_root` with default limits. Fails with
    /// `WeakSecret` when the signing secret is under `MIN_SECRET_LEN`
    /// bytes.
    pub fn new(video_root: impl Into<PathBuf>, secret: &str) -> StreamResult<Self> {
        Self::with_limits(video_root, secret, DEFAULT_MAX_PAYLOAD, DEFAULT_MAX_STREAMS)
    }

    /// Construct with explicit payload and concurrency limits.
    pub fn with_limits(
        video_root: impl Into<PathBuf>,
        secret: &str,
        max_payload: u64,
        max_streams: usize,
    ) -> StreamResult<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(StreamError::WeakSecret {
                length: secret.len(),
                min: MIN_SECRET_LEN,
            });
        }
        let video_root = video_root.into();
        fs::create_dir_all(&video_root)?;
        info!(root = %video_root.display(), "video streamer initialized");
        Ok(Self {
            video_root,
            secret: secret.as_bytes().to_vec(),
            max_payload,
            max_streams,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The video subtree root.
    pub fn video_root(&self) -> &Path {
        &self.video_root
    }

    /// Streams currently being served.
    pub fn active_streams(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Store
    // -----------------------------------------------------------------------

    /// Store a media payload under `{root}/{user_id}/{session_id}/
    /// {filename}` atomically. Returns the final resolved path.
    pub fn store(
        &self,
        user_id: &str,
        session_id: &str,
        payload: &[u8],
        filename: &str,
    ) -> StreamResult<PathBuf> {
        validate_segment(user_id)?;
        validate_segment(session_id)?;
        let safe_name = sanitize_filename(filename)?;

        if payload.len() as u64 > self.max_payload {
            return Err(StreamError::PayloadTooLarge {
                size: payload.len() as u64,
                max: self.max_payload,
            });
        }

        let dir = self.video_root.join(user_id).join(session_id);
        fs::create_dir_all(&dir)?;

        // Containment is re-checked on the resolved directory: even if the
        // segment validation were bypassed, a canonicalized escape (via
        // `..` or a planted symlink) is caught here.
        let canonical_dir = self.contained_canonical(&dir)?;
        let target = canonical_dir.join(&safe_name);

        atomic_write(&target, payload)?;
        info!(
            user_id,
            session_id,
            filename = %safe_name,
            bytes = payload.len(),
            "video stored"
        );
        Ok(target)
    }

    // -----------------------------------------------------------------------
    // Tokens
    // -----------------------------------------------------------------------

    /// Issue a signed, time-limited access token for a stored file.
    /// Returns `None` when the target does not exist.
    pub fn generate_access_token(
        &self,
        user_id: &str,
        session_id: &str,
        filename: &str,
    ) -> StreamResult<Option<String>> {
        validate_segment(user_id)?;
        validate_segment(session_id)?;
        let safe_name = sanitize_filename(filename)?;

        let path = self
            .video_root
            .join(user_id)
            .join(session_id)
            .join(&safe_name);
        if !path.is_file() {
            debug!(user_id, session_id, filename = %safe_name, "no token: file absent");
            return Ok(None);
        }

        let claims = TokenClaims::new(user_id, session_id, &safe_name, Utc::now());
        Ok(Some(sign_token(&self.secret, &claims)))
    }

    // -----------------------------------------------------------------------
    // Stream
    // -----------------------------------------------------------------------

    /// Serve a byte range of the file a token grants access to.
    ///
    /// `range_start` is inclusive and `range_end` exclusive; both are
    /// clamped to the actual file size, so a start at or past EOF yields
    /// an empty stream rather than an error. The returned stream holds a
    /// concurrency slot released on drop.
    pub fn stream(
        &self,
        token: &str,
        range_start: u64,
        range_end: Option<u64>,
    ) -> StreamResult<StreamOutcome> {
        let claims = verify_token(&self.secret, token, Utc::now())?;

        // The claims were signed by us, but re-validate anyway: the
        // signing key could have been used by an older, laxer issuer.
        validate_segment(&claims.user)?;
        validate_segment(&claims.session)?;
        let safe_name = sanitize_filename(&claims.filename)?;

        let path = self
            .video_root
            .join(&claims.user)
            .join(&claims.session)
            .join(&safe_name);

        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StreamError::NotFound(safe_name));
            }
            Err(err) => return Err(err.into()),
        };
        if meta.file_type().is_symlink() {
            warn!(path = %path.display(), "refusing to stream a symlink");
            return Err(StreamError::PathViolation(format!(
                "{} is a symlink",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            self.contained_canonical(parent)?;
        }

        // Claim a concurrency slot; over the cap is a structured outcome.
        let previous = self.active.fetch_add(1, Ordering::SeqCst);
        if previous >= self.max_streams {
            self.active.fetch_sub(1, Ordering::SeqCst);
            debug!(active = previous, max = self.max_streams, "stream slot exhausted");
            return Ok(StreamOutcome::TooManyStreams {
                active: previous,
                max: self.max_streams,
            });
        }
        let slot = StreamSlot {
            active: Arc::clone(&self.active),
        };

        let file_size = meta.len();
        let start = range_start.min(file_size);
        let end = range_end.unwrap_or(file_size).min(file_size).max(start);

        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(start))?;

        debug!(
            path = %path.display(),
            start,
            end,
            file_size,
            "stream opened"
        );
        Ok(StreamOutcome::Stream(VideoStream {
            file,
            remaining: end - start,
            start,
            end,
            file_size,
            _slot: slot,
        }))
    }

    /// Canonicalize `path` and require it to stay under the video root.
    fn contained_canonical(&self, path: &Path) -> StreamResult<PathBuf> {
        let canonical_root = fs::canonicalize(&self.video_root)?;
        let canonical = fs::canonicalize(path)?;
        if !canonical.starts_with(&canonical_root) {
            warn!(
                path = %canonical.display(),
                root = %canonical_root.display(),
                "path escaped the video root"
            );
            return Err(StreamError::PathViolation(format!(
                "{} escapes the video root",
                canonical.display()
            )));
        }
        Ok(canonical)
    }
}

/// RAII concurrency slot; decremented on every exit path, including a
/// client disconnect dropping the stream mid-iteration.
#[derive(Debug)]
struct StreamSlot {
    active: Arc<AtomicUsize>,
}

impl Drop for StreamSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fixed-size chunked reader over the granted byte range.
#[derive(Debug)]
pub struct VideoStream {
    file: File,
    remaining: u64,
    pub start: u64,
    pub end: u64,
    pub file_size: u64,
    _slot: StreamSlot,
}

impl VideoStream {
    /// Bytes this stream will yield in total.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// True when the clamped range is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Iterator for VideoStream {
    type Item = std::io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let len = self.remaining.min(STREAM_CHUNK_SIZE as u64) as usize;
        let mut chunk = vec![0u8; len];
        match self.file.read_exact(&mut chunk) {
            Ok(()) => {
                self.remaining -= len as u64;
                Some(Ok(chunk))
            }
            Err(err) => {
                self.remaining = 0;
                Some(Err(err))
            }
        }
    }
}

/// A user or session id: 1..=64 chars of `[A-Za-z0-9_-]`.
fn validate_segment(segment: &str) -> StreamResult<()> {
    let ok = !segment.is_empty()
        && segment.len() <= MAX_SEGMENT_LEN
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
    if ok {
        Ok(())
    } else {
        Err(StreamError::InvalidIdentifier(segment.to_string()))
    }
}

/// Reduce a filename to a safe character set: `[A-Za-z0-9._-]`, no leading
/// dots, bounded length.
fn sanitize_filename(filename: &str) -> StreamResult<String> {
    let replaced: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = replaced.trim_start_matches('.');
    let bounded: String = trimmed.chars().take(MAX_FILENAME_LEN).collect();
    if bounded.is_empty() {
        return Err(StreamError::InvalidIdentifier(filename.to_string()));
    }
    Ok(bounded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SECRET: &str = "a-test-secret-at-least-32-bytes!";

    fn streamer_in(dir: &TempDir) -> VideoStreamer {
        VideoStreamer::new(dir.path().join("videos"), SECRET).unwrap()
    }

    fn collect(stream: VideoStream) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in stream {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[test]
    fn test_weak_secret_refused() {
        let dir = TempDir::new().unwrap();
        match VideoStreamer::new(dir.path().join("videos"), "short") {
            Err(StreamError::WeakSecret { length, min }) => {
                assert_eq!(length, 5);
                assert_eq!(min, MIN_SECRET_LEN);
            }
            other => panic!("expected WeakSecret, got {other:?}"),
        }
    }

    #[test]
    fn test_store_and_stream_roundtrip() {
        let dir = TempDir::new().unwrap();
        let streamer = streamer_in(&dir);
        let payload = b"fake mp4 payload".to_vec();
        streamer.store("alice", "sess-1", &payload, "clip.mp4").unwrap();

        let token = streamer
            .generate_access_token("alice", "sess-1", "clip.mp4")
            .unwrap()
            .expect("token for existing file");

        match streamer.stream(&token, 0, None).unwrap() {
            StreamOutcome::Stream(stream) => {
                assert_eq!(stream.file_size, payload.len() as u64);
                assert_eq!(collect(stream), payload);
            }
            other => panic!("expected Stream, got {other:?}"),
        }
    }

    #[test]
    fn test_traversal_ids_rejected() {
        let dir = TempDir::new().unwrap();
        let streamer = streamer_in(&dir);
        for bad in ["../escape", "a/b", "", "a b", &"x".repeat(100)] {
            assert!(
                matches!(
                    streamer.store(bad, "sess-1", b"x", "clip.mp4"),
                    Err(StreamError::InvalidIdentifier(_))
                ),
                "id {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_filename_is_sanitized() {
        let dir = TempDir::new().unwrap();
        let streamer = streamer_in(&dir);
        let path = streamer
            .store("alice", "sess-1", b"x", "../../evil name.mp4")
            .unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(!name.contains('/') && !name.contains(' '));
        assert!(!name.starts_with('.'));
        assert!(path.starts_with(dir.path().join("videos")));
    }

    #[test]
    fn test_oversize_payload_rejected() {
        let dir = TempDir::new().unwrap();
        let streamer =
            VideoStreamer::with_limits(dir.path().join("videos"), SECRET, 16, 4).unwrap();
        match streamer.store("alice", "sess-1", &[0u8; 17], "big.mp4") {
            Err(StreamError::PayloadTooLarge { size, max }) => {
                assert_eq!(size, 17);
                assert_eq!(max, 16);
            }
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_token_for_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let streamer = streamer_in(&dir);
        let token = streamer
            .generate_access_token("alice", "sess-1", "nope.mp4")
            .unwrap();
        assert!(token.is_none());
    }

    #[test]
    fn test_expired_token_rejected_by_stream() {
        let dir = TempDir::new().unwrap();
        let streamer = streamer_in(&dir);
        streamer.store("alice", "sess-1", b"data", "clip.mp4").unwrap();

        let stale = TokenClaims {
            user: "alice".to_string(),
            session: "sess-1".to_string(),
            filename: "clip.mp4".to_string(),
            iat: 1_000,
            exp: 2_000, // long past
        };
        let token = sign_token(SECRET.as_bytes(), &stale);

        match streamer.stream(&token, 0, None) {
            Err(StreamError::Token(crate::token::TokenError::Expired)) => {}
            other => panic!("expected Expired, got {other:?}"),
        }
    }

    #[test]
    fn test_range_start_at_eof_is_clamped() {
        let dir = TempDir::new().unwrap();
        let streamer = streamer_in(&dir);
        streamer.store("alice", "sess-1", b"0123456789", "clip.mp4").unwrap();
        let token = streamer
            .generate_access_token("alice", "sess-1", "clip.mp4")
            .unwrap()
            .unwrap();

        for start in [10, 11, 10_000] {
            match streamer.stream(&token, start, None).unwrap() {
                StreamOutcome::Stream(stream) => {
                    assert!(stream.is_empty(), "start {start} should clamp to empty");
                    assert_eq!(collect(stream), b"");
                }
                other => panic!("expected Stream, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_partial_range() {
        let dir = TempDir::new().unwrap();
        let streamer = streamer_in(&dir);
        streamer.store("alice", "sess-1", b"0123456789", "clip.mp4").unwrap();
        let token = streamer
            .generate_access_token("alice", "sess-1", "clip.mp4")
            .unwrap()
            .unwrap();

        match streamer.stream(&token, 2, Some(6)).unwrap() {
            StreamOutcome::Stream(stream) => {
                assert_eq!(stream.len(), 4);
                assert_eq!(collect(stream), b"2345");
            }
            other => panic!("expected Stream, got {other:?}"),
        }
    }

    #[test]
    fn test_chunks_are_bounded() {
        let dir = TempDir::new().unwrap();
        let streamer = streamer_in(&dir);
        let payload = vec![7u8; STREAM_CHUNK_SIZE * 2 + 100];
        streamer.store("alice", "sess-1", &payload, "big.bin").unwrap();
        let token = streamer
            .generate_access_token("alice", "sess-1", "big.bin")
            .unwrap()
            .unwrap();

        match streamer.stream(&token, 0, None).unwrap() {
            StreamOutcome::Stream(stream) => {
                let mut total = 0usize;
                for chunk in stream {
                    let chunk = chunk.unwrap();
                    assert!(chunk.len() <= STREAM_CHUNK_SIZE);
                    total += chunk.len();
                }
                assert_eq!(total, payload.len());
            }
            other => panic!("expected Stream, got {other:?}"),
        }
    }

    #[test]
    fn test_concurrency_cap_and_slot_release() {
        let dir = TempDir::new().unwrap();
        let streamer = VideoStreamer::with_limits(
            dir.path().join("videos"),
            SECRET,
            DEFAULT_MAX_PAYLOAD,
            1,
        )
        .unwrap();
        streamer.store("alice", "sess-1", b"data", "clip.mp4").unwrap();
        let token = streamer
            .generate_access_token("alice", "sess-1", "clip.mp4")
            .unwrap()
            .unwrap();

        let held = match streamer.stream(&token, 0, None).unwrap() {
            StreamOutcome::Stream(stream) => stream,
            other => panic!("expected Stream, got {other:?}"),
        };
        assert_eq!(streamer.active_streams(), 1);

        match streamer.stream(&token, 0, None).unwrap() {
            StreamOutcome::TooManyStreams { active, max } => {
                assert_eq!(active, 1);
                assert_eq!(max, 1);
            }
            other => panic!("expected TooManyStreams, got {other:?}"),
        }

        // Dropping the stream mid-flight releases the slot.
        drop(held);
        assert_eq!(streamer.active_streams(), 0);
        assert!(matches!(
            streamer.stream(&token, 0, None).unwrap(),
            StreamOutcome::Stream(_)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_refused() {
        let dir = TempDir::new().unwrap();
        let streamer = streamer_in(&dir);
        streamer.store("alice", "sess-1", b"data", "real.mp4").unwrap();

        // Plant a symlink where a media file should be.
        let secret_file = dir.path().join("outside.txt");
        fs::write(&secret_file, b"confidential").unwrap();
        let link = dir
            .path()
            .join("videos")
            .join("alice")
            .join("sess-1")
            .join("link.mp4");
        std::os::unix::fs::symlink(&secret_file, &link).unwrap();

        let claims = TokenClaims::new("alice", "sess-1", "link.mp4", Utc::now());
        let token = sign_token(SECRET.as_bytes(), &claims);

        match streamer.stream(&token, 0, None) {
            Err(StreamError::PathViolation(_)) => {}
            other => panic!("expected PathViolation, got {other:?}"),
        }
    }
}
