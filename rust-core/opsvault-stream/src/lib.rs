// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Video Streamer
//
// A specialization of the entity store's write path for large binary
// media: signed time-limited access tokens, path-traversal and symlink
// rejection, and byte-range chunked delivery under a concurrent-stream
// cap. Media live under `{root}/videos/{user_id}/{session_id}/{filename}`
// and are written with the same atomic temp+fsync+rename primitive the
// entity store uses.
//
// # Modules
//
// - [`token`] -- three-segment HMAC-SHA256 access tokens with constant-
//   time verification.
// - [`streamer`] -- the hardened `VideoStreamer` store/token/stream path.
// - [`error`] -- structured streamer errors.

pub mod error;
pub mod streamer;
pub mod token;

// Re-export the primary public API for ergonomic imports.
pub use error::{StreamError, StreamResult};
pub use streamer::{
    StreamOutcome, VideoStream, VideoStreamer, DEFAULT_MAX_PAYLOAD, DEFAULT_MAX_STREAMS,
    MIN_SECRET_LEN, STREAM_CHUNK_SIZE,
};
pub use token::{sign_token, verify_token, TokenClaims, TokenError, TOKEN_TTL_MINUTES};
