// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Engine - Error types

use thiserror::Error;

/// Errors that can occur while configuring or starting the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A required environment variable is not set.
    #[error("missing required environment variable: {0}")]
    MissingEnv(String),

    /// An environment variable holds an unparseable value.
    #[error("bad value for {var}: {value:?}")]
    BadEnv { var: String, value: String },

    /// The entity store failed to open.
    #[error("store error: {0}")]
    Store(#[from] opsvault_store::StoreError),

    /// The video subsystem refused to start (weak secret, I/O failure).
    #[error("stream error: {0}")]
    Stream(#[from] opsvault_stream::StreamError),
}

/// Convenience type alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;
