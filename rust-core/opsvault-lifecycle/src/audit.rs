// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Lifecycle Manager - Append-only audit trail
//
// Every state transition and every sweep summary is appended to
// `audit/lifecycle.log`, one JSON object per line. Records are never
// updated or deleted.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use opsvault_store::atomic::append_line;
use opsvault_store::{EntityType, LifecycleState};

use crate::error::{LifecycleError, LifecycleResult};

/// One entity-level failure captured during a sweep, without aborting the
/// remaining batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub error: String,
}

/// Structured summary of one sweep run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    /// Candidates scanned (entities in COMPLETED or BACKED_UP state).
    pub checked: usize,
    /// Entities fully destroyed this run.
    pub deleted: usize,
    /// Candidates that failed one or more guards.
    pub skipped: usize,
    /// Per-entity failures.
    pub errors: Vec<SweepFailure>,
}

/// One line of the lifecycle audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    Transition {
        timestamp: DateTime<Utc>,
        entity_type: EntityType,
        entity_id: String,
        old_state: LifecycleState,
        new_state: LifecycleState,
        forced: bool,
    },
    Sweep {
        timestamp: DateTime<Utc>,
        sweep_id: String,
        summary: SweepSummary,
    },
}

/// Append-only writer/reader for the lifecycle audit log.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one audit event.
    pub fn append(&self, event: &AuditEvent) -> LifecycleResult<()> {
        let line = serde_json::to_string(event)
            .map_err(|err| LifecycleError::Audit(err.to_string()))?;
        append_line(&self.path, &line)?;
        Ok(())
    }

    /// Read back every audit event, oldest first.
    pub fn read_events(&self) -> LifecycleResult<Vec<AuditEvent>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(LifecycleError::Store(err.into())),
        };

        let mut events = Vec::new();
        for line in contents.lines().filter(|l| !l.is_empty()) {
            let event = serde_json::from_str(line)
                .map_err(|err| LifecycleError::Audit(format!("bad audit record: {err}")))?;
            events.push(event);
        }
        Ok(events)
    }
}
