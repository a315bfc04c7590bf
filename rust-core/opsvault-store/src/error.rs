// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Entity Store - Error types
//
// Covers all failure modes of the store: I/O and serialization failures,
// missing or duplicate entities, unsafe entity identifiers, index corruption,
// and lock contention.

use thiserror::Error;

use crate::types::EntityType;

/// Errors that can occur during entity store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred while reading or writing store files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization of a record or metadata
    /// document failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The requested entity does not exist.
    #[error("entity not found: {entity_type}/{entity_id}")]
    NotFound {
        entity_type: EntityType,
        entity_id: String,
    },

    /// An entity with this id is already indexed for the type.
    #[error("entity already exists: {entity_type}/{entity_id}")]
    AlreadyExists {
        entity_type: EntityType,
        entity_id: String,
    },

    /// The entity id is empty, too long, or contains characters that are
    /// unsafe in a file name.
    #[error("invalid entity id: {0:?}")]
    InvalidEntityId(String),

    /// An on-disk structure failed validation (CRC mismatch, malformed log
    /// line). The log remains the source of truth; indexes can be rebuilt.
    #[error("corrupted data in {path}: {detail}")]
    Corrupted { path: String, detail: String },

    /// The per-entity advisory lock could not be acquired within the
    /// bounded retry window. Another writer holds it.
    #[error("entity lock busy: {entity_id} (waited {waited_ms} ms)")]
    LockBusy { entity_id: String, waited_ms: u64 },
}

/// Convenience type alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = StoreError::NotFound {
            entity_type: EntityType::Users,
            entity_id: "u1".to_string(),
        };
        assert_eq!(err.to_string(), "entity not found: users/u1");
    }

    #[test]
    fn test_already_exists_display() {
        let err = StoreError::AlreadyExists {
            entity_type: EntityType::Targets,
            entity_id: "t9".to_string(),
        };
        assert!(err.to_string().contains("targets/t9"));
    }

    #[test]
    fn test_corrupted_display() {
        let err = StoreError::Corrupted {
            path: "users/u1.idx".to_string(),
            detail: "crc mismatch".to_string(),
        };
        assert!(err.to_string().contains("users/u1.idx"));
        assert!(err.to_string().contains("crc mismatch"));
    }

    #[test]
    fn test_lock_busy_display() {
        let err = StoreError::LockBusy {
            entity_id: "u1".to_string(),
            waited_ms: 2000,
        };
        assert!(err.to_string().contains("2000"));
    }
}
