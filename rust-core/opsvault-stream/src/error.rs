// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Video Streamer - Error types
//
// Security checks fail with structured reasons: a traversal attempt is a
// `PathViolation`, an oversize upload reports both sizes, a weak signing
// secret refuses construction outright.

use thiserror::Error;

use crate::token::TokenError;

/// Errors that can occur on the video store/stream path.
#[derive(Debug, Error)]
pub enum StreamError {
    /// An I/O error occurred while writing or reading media.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A shared durability primitive (atomic write) failed.
    #[error("stream store primitive error: {0}")]
    Store(#[from] opsvault_store::StoreError),

    /// The signing secret is shorter than the enforced minimum; the video
    /// subsystem refuses to start without a usable secret.
    #[error("signing secret too short: {length} bytes (min: {min})")]
    WeakSecret { length: usize, min: usize },

    /// A user or session id is not a short alphanumeric-plus-hyphen/
    /// underscore string, or a filename sanitized to nothing.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// The payload exceeds the maximum allowed size.
    #[error("payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: u64, max: u64 },

    /// The resolved path escaped the video root or crossed a symlink.
    #[error("path violation: {0}")]
    PathViolation(String),

    /// The requested media file does not exist.
    #[error("video not found: {0}")]
    NotFound(String),

    /// Token verification failed (malformed, bad signature, or expired).
    #[error("access token rejected: {0}")]
    Token(#[from] TokenError),
}

/// Convenience type alias for streamer results.
pub type StreamResult<T> = Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weak_secret_display() {
        let err = StreamError::WeakSecret { length: 8, min: 32 };
        assert!(err.to_string().contains('8'));
        assert!(err.to_string().contains("32"));
    }

    #[test]
    fn test_token_error_wraps() {
        let err = StreamError::from(TokenError::Expired);
        assert!(err.to_string().contains("expired"));
    }
}
