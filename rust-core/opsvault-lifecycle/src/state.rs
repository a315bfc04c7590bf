// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Lifecycle Manager - Transition table and deletion guards
//
// The state machine:
//
//   CREATED -> ACTIVE -> COMPLETED -> { BACKED_UP, MARKED_FOR_DELETION }
//   BACKED_UP -> MARKED_FOR_DELETION -> DELETED
//
// DELETED is terminal. Any transition not in the table is rejected with
// the set of currently valid targets. Marking for deletion additionally
// requires five independent guards to pass unless the caller forces the
// transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use opsvault_store::{EntityMetadata, LifecycleState};

/// Minimum entity age before deletion guards allow destruction.
pub const MIN_RETENTION_DAYS: i64 = 30;

/// Valid transition targets from a given state.
pub fn valid_targets(from: LifecycleState) -> &'static [LifecycleState] {
    match from {
        LifecycleState::Created => &[LifecycleState::Active],
        LifecycleState::Active => &[LifecycleState::Completed],
        LifecycleState::Completed => &[
            LifecycleState::BackedUp,
            LifecycleState::MarkedForDeletion,
        ],
        LifecycleState::BackedUp => &[LifecycleState::MarkedForDeletion],
        LifecycleState::MarkedForDeletion => &[LifecycleState::Deleted],
        LifecycleState::Deleted => &[],
    }
}

/// True when `from -> to` appears in the transition table.
pub fn is_valid_transition(from: LifecycleState, to: LifecycleState) -> bool {
    valid_targets(from).contains(&to)
}

// ---------------------------------------------------------------------------
// Deletion guards
// ---------------------------------------------------------------------------

/// The five independent preconditions for marking an entity for deletion,
/// evaluated eagerly against the entity's metadata. Each field is one
/// guard; all must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardReport {
    /// Current state is COMPLETED or BACKED_UP.
    pub state_eligible: bool,
    /// Entity age is at least `MIN_RETENTION_DAYS` since `created_at`.
    pub age_met: bool,
    /// A backup of the entity has been verified.
    pub backup_verified: bool,
    /// The entity's on-disk integrity has been verified.
    pub integrity_verified: bool,
    /// No legal hold is in effect.
    pub no_legal_hold: bool,
}

impl GuardReport {
    /// Evaluate all five guards against a metadata document at `now`.
    pub fn evaluate(metadata: &EntityMetadata, now: DateTime<Utc>) -> Self {
        let state_eligible = matches!(
            metadata.lifecycle_state,
            LifecycleState::Completed | LifecycleState::BackedUp
        );
        let age_met = (now - metadata.created_at).num_days() >= MIN_RETENTION_DAYS;
        Self {
            state_eligible,
            age_met,
            backup_verified: metadata.backup_verified,
            integrity_verified: metadata.integrity_verified,
            no_legal_hold: !metadata.legal_hold,
        }
    }

    /// True only when every guard passes.
    pub fn all_pass(&self) -> bool {
        self.state_eligible
            && self.age_met
            && self.backup_verified
            && self.integrity_verified
            && self.no_legal_hold
    }

    /// Names of the guards that failed, for structured error reporting.
    pub fn failed_guards(&self) -> Vec<String> {
        let mut failed = Vec::new();
        if !self.state_eligible {
            failed.push("state_eligible".to_string());
        }
        if !self.age_met {
            failed.push("age_met".to_string());
        }
        if !self.backup_verified {
            failed.push("backup_verified".to_string());
        }
        if !self.integrity_verified {
            failed.push("integrity_verified".to_string());
        }
        if !self.no_legal_hold {
            failed.push("no_legal_hold".to_string());
        }
        failed
    }
}
