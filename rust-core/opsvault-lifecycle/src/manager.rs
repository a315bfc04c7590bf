// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Lifecycle Manager - Transition enforcement and sweep execution
//
// The manager is the only writer of entity metadata. It validates every
// transition against the state table, evaluates the five deletion guards
// when an entity is marked for destruction, delegates the destructive
// removal to the secure wiper, and appends every decision to the audit
// trail. Per-entity failures during a sweep are isolated so one bad entity
// never aborts the batch.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use opsvault_store::{EntityMetadata, EntityStore, EntityType, LifecycleState};
use opsvault_wiper::SecureWiper;

use crate::audit::{AuditEvent, AuditLog, SweepFailure, SweepSummary};
use crate::error::{LifecycleError, LifecycleResult};
use crate::state::{is_valid_transition, valid_targets, GuardReport};

/// Entity types covered by the background sweep. The audit trail and the
/// index bookkeeping type are never swept.
pub const SWEEP_TYPES: [EntityType; 8] = [
    EntityType::Users,
    EntityType::Sessions,
    EntityType::Devices,
    EntityType::Targets,
    EntityType::Reports,
    EntityType::Videos,
    EntityType::Training,
    EntityType::Backups,
];

/// Read-only guard simulation for one candidate entity.
#[derive(Debug, Clone)]
pub struct DeletionPreview {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub state: LifecycleState,
    pub guards: GuardReport,
    pub eligible: bool,
}

/// Governs entity retention: state transitions, deletion guards, and the
/// sweep that feeds the secure wiper.
#[derive(Debug)]
pub struct LifecycleManager {
    store: Arc<EntityStore>,
    wiper: Arc<SecureWiper>,
    audit: AuditLog,
}

impl LifecycleManager {
    /// Build a manager over an open store, logging to
    /// `{root}/audit/lifecycle.log` and delegating destruction to `wiper`.
    pub fn new(store: Arc<EntityStore>, wiper: Arc<SecureWiper>) -> Self {
        let audit = AuditLog::new(store.root().join("audit").join("lifecycle.log"));
        Self {
            store,
            wiper,
            audit,
        }
    }

    /// The underlying entity store.
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// The lifecycle audit log.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Transition an entity to `new_state`.
    ///
    /// The state table is always enforced. When the target is
    /// `MARKED_FOR_DELETION` and `force` is false, all five deletion
    /// guards must pass; `force` bypasses the guards (administrative
    /// override) but never the table. Success appends an audit record.
    pub fn transition(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        new_state: LifecycleState,
        force: bool,
    ) -> LifecycleResult<EntityMetadata> {
        let mut metadata = self.store.read_metadata(entity_type, entity_id)?;
        let old_state = metadata.lifecycle_state;

        if !is_valid_transition(old_state, new_state) {
            return Err(LifecycleError::InvalidTransition {
                from: old_state,
                to: new_state,
                valid: valid_targets(old_state).to_vec(),
            });
        }

        if new_state == LifecycleState::MarkedForDeletion && !force {
            let guards = GuardReport::evaluate(&metadata, Utc::now());
            if !guards.all_pass() {
                return Err(LifecycleError::GuardsFailed {
                    entity_type,
                    entity_id: entity_id.to_string(),
                    failed: guards.failed_guards(),
                });
            }
        }

        metadata.lifecycle_state = new_state;
        self.store
            .write_metadata(entity_type, entity_id, &metadata)?;

        self.audit.append(&AuditEvent::Transition {
            timestamp: Utc::now(),
            entity_type,
            entity_id: entity_id.to_string(),
            old_state,
            new_state,
            forced: force,
        })?;

        info!(
            entity_type = %entity_type,
            entity_id,
            old_state = %old_state,
            new_state = %new_state,
            forced = force,
            "lifecycle transition"
        );
        Ok(metadata)
    }

    /// Record that a backup of the entity has been verified.
    pub fn set_backup_verified(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        verified: bool,
    ) -> LifecycleResult<()> {
        self.update_metadata(entity_type, entity_id, |meta| {
            meta.backup_verified = verified;
        })
    }

    /// Record the result of an integrity verification pass.
    pub fn set_integrity_verified(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        verified: bool,
    ) -> LifecycleResult<()> {
        self.update_metadata(entity_type, entity_id, |meta| {
            meta.integrity_verified = verified;
        })
    }

    /// Place or lift a legal hold. A held entity can never be marked for
    /// deletion without `force`.
    pub fn set_legal_hold(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        hold: bool,
    ) -> LifecycleResult<()> {
        self.update_metadata(entity_type, entity_id, |meta| {
            meta.legal_hold = hold;
        })
    }

    fn update_metadata(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        mutate: impl FnOnce(&mut EntityMetadata),
    ) -> LifecycleResult<()> {
        let mut metadata = self.store.read_metadata(entity_type, entity_id)?;
        mutate(&mut metadata);
        self.store
            .write_metadata(entity_type, entity_id, &metadata)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Preview and sweep
    // -----------------------------------------------------------------------

    /// Simulate guard evaluation for every deletion candidate without
    /// mutating anything.
    pub fn get_deletion_preview(
        &self,
        entity_type: Option<EntityType>,
    ) -> LifecycleResult<Vec<DeletionPreview>> {
        let types: Vec<EntityType> = match entity_type {
            Some(ty) => vec![ty],
            None => SWEEP_TYPES.to_vec(),
        };

        let now = Utc::now();
        let mut previews = Vec::new();
        for ty in types {
            for entity_id in self.store.entity_ids(ty)? {
                let metadata = self.store.read_metadata(ty, &entity_id)?;
                if !matches!(
                    metadata.lifecycle_state,
                    LifecycleState::Completed | LifecycleState::BackedUp
                ) {
                    continue;
                }
                let guards = GuardReport::evaluate(&metadata, now);
                previews.push(DeletionPreview {
                    entity_type: ty,
                    entity_id,
                    state: metadata.lifecycle_state,
                    eligible: guards.all_pass(),
                    guards,
                });
            }
        }
        Ok(previews)
    }

    /// One sweep pass: scan candidates, re-check guards, mark and destroy
    /// fully eligible entities, and append a structured summary to the
    /// audit trail. A failure on one entity is recorded and the sweep
    /// moves on.
    pub fn run_sweep_once(&self) -> LifecycleResult<SweepSummary> {
        let sweep_id = Uuid::new_v4().to_string();
        let mut summary = SweepSummary::default();

        for ty in SWEEP_TYPES {
            let entity_ids = match self.store.entity_ids(ty) {
                Ok(ids) => ids,
                Err(err) => {
                    summary.errors.push(SweepFailure {
                        entity_type: ty,
                        entity_id: "*".to_string(),
                        error: err.to_string(),
                    });
                    continue;
                }
            };

            for entity_id in entity_ids {
                match self.sweep_entity(ty, &entity_id, &mut summary) {
                    Ok(()) => {}
                    Err(err) => {
                        warn!(entity_type = %ty, entity_id = %entity_id, error = %err, "sweep entity failed");
                        summary.errors.push(SweepFailure {
                            entity_type: ty,
                            entity_id,
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        if summary.deleted > 0 {
            self.store.invalidate_cache();
        }

        self.audit.append(&AuditEvent::Sweep {
            timestamp: Utc::now(),
            sweep_id: sweep_id.clone(),
            summary: summary.clone(),
        })?;

        info!(
            sweep_id = %sweep_id,
            checked = summary.checked,
            deleted = summary.deleted,
            skipped = summary.skipped,
            errors = summary.errors.len(),
            "sweep complete"
        );
        Ok(summary)
    }

    /// Evaluate and, when fully eligible, destroy one entity.
    fn sweep_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        summary: &mut SweepSummary,
    ) -> LifecycleResult<()> {
        let metadata = self.store.read_metadata(entity_type, entity_id)?;
        if !matches!(
            metadata.lifecycle_state,
            LifecycleState::Completed | LifecycleState::BackedUp
        ) {
            return Ok(());
        }

        summary.checked += 1;

        let guards = GuardReport::evaluate(&metadata, Utc::now());
        if !guards.all_pass() {
            summary.skipped += 1;
            return Ok(());
        }

        self.transition(
            entity_type,
            entity_id,
            LifecycleState::MarkedForDeletion,
            false,
        )?;

        let report = self
            .wiper
            .secure_wipe_entity(&self.store.type_dir(entity_type), entity_id)?;
        if !report.all_verified {
            return Err(LifecycleError::WipeUnverified {
                entity_type,
                entity_id: entity_id.to_string(),
            });
        }

        // The entity's files are gone; the terminal transition lives only
        // in the audit trail.
        self.audit.append(&AuditEvent::Transition {
            timestamp: Utc::now(),
            entity_type,
            entity_id: entity_id.to_string(),
            old_state: LifecycleState::MarkedForDeletion,
            new_state: LifecycleState::Deleted,
            forced: false,
        })?;

        summary.deleted += 1;
        Ok(())
    }
}
