// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Lifecycle Manager - Error types
//
// Lifecycle violations are structured: an invalid transition reports the
// set of currently valid target states, and a guard failure names every
// guard that failed. Callers never get a bare boolean.

use thiserror::Error;

use opsvault_store::{EntityType, LifecycleState, StoreError};
use opsvault_wiper::WipeError;

/// Errors that can occur during lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The underlying entity store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The secure wiper failed during a delegated erasure.
    #[error("wipe error: {0}")]
    Wipe(#[from] WipeError),

    /// The requested transition is not present in the state table.
    #[error("invalid transition {from} -> {to}; valid targets: {valid:?}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
        valid: Vec<LifecycleState>,
    },

    /// One or more deletion guards failed. `failed` lists each failed
    /// guard by name.
    #[error("deletion guards failed for {entity_type}/{entity_id}: {failed:?}")]
    GuardsFailed {
        entity_type: EntityType,
        entity_id: String,
        failed: Vec<String>,
    },

    /// The delegated wipe completed but one or more files did not
    /// individually verify; the entity cannot be recorded as deleted.
    #[error("wipe verification failed for {entity_type}/{entity_id}")]
    WipeUnverified {
        entity_type: EntityType,
        entity_id: String,
    },

    /// A lifecycle audit record could not be serialized or appended.
    #[error("audit log error: {0}")]
    Audit(String),
}

/// Convenience type alias for lifecycle results.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_reports_valid_targets() {
        let err = LifecycleError::InvalidTransition {
            from: LifecycleState::Created,
            to: LifecycleState::Deleted,
            valid: vec![LifecycleState::Active],
        };
        let message = err.to_string();
        assert!(message.contains("CREATED"));
        assert!(message.contains("DELETED"));
        assert!(message.contains("Active"));
    }

    #[test]
    fn test_guards_failed_names_guards() {
        let err = LifecycleError::GuardsFailed {
            entity_type: EntityType::Reports,
            entity_id: "r1".to_string(),
            failed: vec!["age_met".to_string(), "legal_hold".to_string()],
        };
        assert!(err.to_string().contains("age_met"));
    }
}
