// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Disk Monitor - Error types

use thiserror::Error;

use opsvault_store::StoreError;

/// Errors that can occur while inspecting the storage volume.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Free-space query or directory walk failed.
    #[error("monitor I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The entity store could not be inspected.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for monitor results.
pub type MonitorResult<T> = Result<T, MonitorError>;
