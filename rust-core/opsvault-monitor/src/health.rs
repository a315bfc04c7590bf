// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Disk Monitor - Storage breakdown and index consistency
//
// `storage_breakdown` walks each entity type's subtree for capacity
// planning. `check_index_health` looks for orphaned logs: a log file with
// no sibling metadata file means the write path violated its invariant.
// Detection only — repair is an explicit operator action, never triggered
// from here.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use opsvault_store::{EntityStore, EntityType};

use crate::error::MonitorResult;

/// Per-type storage accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeBreakdown {
    pub entity_type: EntityType,
    /// All files under the type's subtree, recursively (media included).
    pub file_count: usize,
    /// Entities, counted by metadata files.
    pub entity_count: usize,
    pub total_bytes: u64,
}

/// A log file whose entity has no metadata document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanedLog {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub log_path: PathBuf,
}

/// Walk every entity type's subtree and report file count, entity count,
/// and total bytes.
pub fn storage_breakdown(store: &EntityStore) -> MonitorResult<Vec<TypeBreakdown>> {
    let mut breakdown = Vec::with_capacity(EntityType::ALL.len());
    for entity_type in EntityType::ALL {
        let dir = store.type_dir(entity_type);
        let mut file_count = 0usize;
        let mut entity_count = 0usize;
        let mut total_bytes = 0u64;
        walk(&dir, &mut |path, size| {
            file_count += 1;
            total_bytes += size;
            if path.extension().and_then(|e| e.to_str()) == Some("meta") {
                entity_count += 1;
            }
        })?;
        breakdown.push(TypeBreakdown {
            entity_type,
            file_count,
            entity_count,
            total_bytes,
        });
    }
    Ok(breakdown)
}

/// Detect orphaned logs across all entity types. Only top-level files are
/// considered: nested media directories are not entity logs.
pub fn check_index_health(store: &EntityStore) -> MonitorResult<Vec<OrphanedLog>> {
    let mut orphans = Vec::new();
    for entity_type in EntityType::ALL {
        let dir = store.type_dir(entity_type);
        if !dir.exists() {
            continue;
        }
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            let Some(entity_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !store.meta_path(entity_type, entity_id).exists() {
                warn!(
                    entity_type = %entity_type,
                    entity_id,
                    "orphaned log detected (no metadata file)"
                );
                orphans.push(OrphanedLog {
                    entity_type,
                    entity_id: entity_id.to_string(),
                    log_path: path,
                });
            }
        }
    }
    Ok(orphans)
}

/// Recursive file walk invoking `visit(path, size)` per file.
fn walk(dir: &Path, visit: &mut impl FnMut(&Path, u64)) -> MonitorResult<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            walk(&path, visit)?;
        } else if file_type.is_file() {
            visit(&path, entry.metadata()?.len());
        }
    }
    Ok(())
}
