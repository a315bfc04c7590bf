// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Entity Store - Core engine
//
// An append-only per-entity log (`{id}.log`, one JSON record per line), a
// CRC32-protected offset index (`{id}.idx`), and an atomically written
// metadata document (`{id}.meta`) per entity, grouped under one directory
// per entity type. Every mutation runs under the entity's advisory file
// lock; every durable write goes through the atomic temp+rename primitive.
// The log is the source of truth; the index is derived and rebuilt when
// missing or corrupt.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::atomic::{append_line, atomic_write};
use crate::cache::ReadCache;
use crate::error::{StoreError, StoreResult};
use crate::index::LogIndex;
use crate::lock::EntityLock;
use crate::types::{
    fold_records, AttrMap, EntityMetadata, EntityType, EntityView, Record, RecordOp,
};

/// Longest accepted entity id. Ids become file names, so they are kept
/// short and within a fixed safe character set.
const MAX_ENTITY_ID_LEN: usize = 128;

/// The storage engine for structured entities.
///
/// One instance owns a storage root, its read cache, and the per-entity
/// lock discipline. Construct it explicitly at startup and share it via
/// `Arc`; there is no process-wide singleton.
#[derive(Debug)]
pub struct EntityStore {
    root: PathBuf,
    cache: ReadCache,
}

impl EntityStore {
    /// Open (or initialize) a storage root. Creates the per-type
    /// directories on first use.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        for entity_type in EntityType::ALL {
            fs::create_dir_all(root.join(entity_type.dir_name()))?;
        }
        info!(root = %root.display(), "entity store opened");
        Ok(Self {
            root,
            cache: ReadCache::new(),
        })
    }

    /// The storage root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all files for one entity type.
    pub fn type_dir(&self, entity_type: EntityType) -> PathBuf {
        self.root.join(entity_type.dir_name())
    }

    /// Path of an entity's append-only record log.
    pub fn log_path(&self, entity_type: EntityType, entity_id: &str) -> PathBuf {
        self.type_dir(entity_type).join(format!("{entity_id}.log"))
    }

    /// Path of an entity's offset index.
    pub fn index_path(&self, entity_type: EntityType, entity_id: &str) -> PathBuf {
        self.type_dir(entity_type).join(format!("{entity_id}.idx"))
    }

    /// Path of an entity's lifecycle metadata document.
    pub fn meta_path(&self, entity_type: EntityType, entity_id: &str) -> PathBuf {
        self.type_dir(entity_type).join(format!("{entity_id}.meta"))
    }

    // -----------------------------------------------------------------------
    // CRUD
    // -----------------------------------------------------------------------

    /// Create a new entity with an initial attribute mapping.
    ///
    /// Appends the `CREATE` record, writes the index, and initializes
    /// metadata in the `CREATED` lifecycle state. Fails with
    /// `AlreadyExists` if the id is already indexed for this type.
    pub fn create(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        attributes: AttrMap,
    ) -> StoreResult<EntityView> {
        validate_entity_id(entity_id)?;
        let _lock = EntityLock::acquire(&self.type_dir(entity_type), entity_id)?;

        if self.exists(entity_type, entity_id) {
            return Err(StoreError::AlreadyExists {
                entity_type,
                entity_id: entity_id.to_string(),
            });
        }

        let record = Record::new(RecordOp::Create, attributes);
        let line = serde_json::to_string(&record)?;

        let log_path = self.log_path(entity_type, entity_id);
        let offset = append_line(&log_path, &line)?;

        let mut index = self.load_index_or_rebuild(entity_type, entity_id)?;
        index.push(offset);
        index.persist(&self.index_path(entity_type, entity_id))?;

        let metadata = EntityMetadata::new();
        self.persist_metadata(entity_type, entity_id, &metadata)?;

        self.cache.invalidate(entity_type, entity_id);
        info!(entity_type = %entity_type, entity_id, "entity created");

        let latest = fold_records([&record]);
        Ok(EntityView {
            latest,
            records: vec![record],
        })
    }

    /// Append an `UPDATE` record to an existing entity's log.
    pub fn append_record(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        attributes: AttrMap,
    ) -> StoreResult<Record> {
        validate_entity_id(entity_id)?;
        let _lock = EntityLock::acquire(&self.type_dir(entity_type), entity_id)?;

        if !self.exists(entity_type, entity_id) {
            return Err(StoreError::NotFound {
                entity_type,
                entity_id: entity_id.to_string(),
            });
        }

        let record = Record::new(RecordOp::Update, attributes);
        let line = serde_json::to_string(&record)?;

        let offset = append_line(&self.log_path(entity_type, entity_id), &line)?;

        let mut index = self.load_index_or_rebuild(entity_type, entity_id)?;
        index.push(offset);
        index.persist(&self.index_path(entity_type, entity_id))?;

        self.cache.invalidate(entity_type, entity_id);
        debug!(entity_type = %entity_type, entity_id, offset, "record appended");

        Ok(record)
    }

    /// Read an entity: the folded latest view plus the full ordered record
    /// list. Served from the in-memory cache when possible.
    pub fn read(&self, entity_type: EntityType, entity_id: &str) -> StoreResult<Arc<EntityView>> {
        if let Some(view) = self.cache.get(entity_type, entity_id) {
            return Ok(view);
        }

        let records = self.read_log(entity_type, entity_id)?;
        let latest = fold_records(records.iter());
        let view = Arc::new(EntityView { latest, records });
        self.cache.put(entity_type, entity_id, Arc::clone(&view));
        Ok(view)
    }

    /// Read a single record by its ordinal, seeking via the offset index
    /// instead of scanning the whole log.
    pub fn read_record(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        sequence: u64,
    ) -> StoreResult<Record> {
        let index = self.load_index_or_rebuild(entity_type, entity_id)?;
        let offset = index.offset_of(sequence).ok_or_else(|| StoreError::NotFound {
            entity_type,
            entity_id: format!("{entity_id}#{sequence}"),
        })?;

        let log_path = self.log_path(entity_type, entity_id);
        let data = fs::read(&log_path)?;
        if offset as usize >= data.len() {
            return Err(StoreError::Corrupted {
                path: self.index_path(entity_type, entity_id).display().to_string(),
                detail: format!("offset {offset} past end of log ({} bytes)", data.len()),
            });
        }
        let tail = &data[offset as usize..];
        let line_end = tail
            .iter()
            .position(|b| *b == b'\n')
            .unwrap_or(tail.len());
        let record = serde_json::from_slice(&tail[..line_end])?;
        Ok(record)
    }

    /// List entities of a type by their metadata, sorted by id, up to
    /// `limit` entries.
    pub fn list(
        &self,
        entity_type: EntityType,
        limit: usize,
    ) -> StoreResult<Vec<(String, EntityMetadata)>> {
        let mut out = Vec::new();
        for entity_id in self.entity_ids(entity_type)? {
            if out.len() >= limit {
                break;
            }
            let metadata = self.read_metadata(entity_type, &entity_id)?;
            out.push((entity_id, metadata));
        }
        Ok(out)
    }

    /// Number of entities of a type, served from the cached tally when one
    /// is present.
    pub fn count(&self, entity_type: EntityType) -> StoreResult<usize> {
        if let Some(count) = self.cache.get_count(entity_type) {
            return Ok(count);
        }
        let count = self.entity_ids(entity_type)?.len();
        self.cache.put_count(entity_type, count);
        Ok(count)
    }

    /// Sorted ids of every entity of a type, derived from `.meta` files.
    pub fn entity_ids(&self, entity_type: EntityType) -> StoreResult<Vec<String>> {
        let dir = self.type_dir(entity_type);
        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("meta") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// True when the entity has durable state on disk.
    pub fn exists(&self, entity_type: EntityType, entity_id: &str) -> bool {
        self.meta_path(entity_type, entity_id).exists()
            || self.log_path(entity_type, entity_id).exists()
    }

    /// Drop all cached reads and tallies, forcing the next read to
    /// re-derive state from disk.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
        debug!("read cache invalidated");
    }

    // -----------------------------------------------------------------------
    // Metadata primitives (consumed by the lifecycle manager)
    // -----------------------------------------------------------------------

    /// Read an entity's lifecycle metadata document.
    pub fn read_metadata(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> StoreResult<EntityMetadata> {
        let path = self.meta_path(entity_type, entity_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    entity_type,
                    entity_id: entity_id.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Atomically replace an entity's metadata document. The caller (the
    /// lifecycle manager) owns the contents; the store owns durability.
    pub fn write_metadata(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        metadata: &EntityMetadata,
    ) -> StoreResult<()> {
        validate_entity_id(entity_id)?;
        let _lock = EntityLock::acquire(&self.type_dir(entity_type), entity_id)?;
        self.persist_metadata(entity_type, entity_id, metadata)?;
        self.cache.invalidate(entity_type, entity_id);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Rebuild an entity's offset index from its log, under the entity
    /// lock. Explicit operator action; never triggered by health checks.
    pub fn rebuild_index(&self, entity_type: EntityType, entity_id: &str) -> StoreResult<usize> {
        validate_entity_id(entity_id)?;
        let _lock = EntityLock::acquire(&self.type_dir(entity_type), entity_id)?;

        let index = LogIndex::rebuild_from_log(&self.log_path(entity_type, entity_id))?;
        index.persist(&self.index_path(entity_type, entity_id))?;
        info!(entity_type = %entity_type, entity_id, records = index.record_count(), "index rebuilt");
        Ok(index.record_count())
    }

    /// Total bytes used by one entity type's subtree (logs, indexes,
    /// metadata, locks, media files).
    pub fn usage_bytes(&self, entity_type: EntityType) -> StoreResult<u64> {
        dir_size(&self.type_dir(entity_type))
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Parse every record line of an entity's log, in append order.
    fn read_log(&self, entity_type: EntityType, entity_id: &str) -> StoreResult<Vec<Record>> {
        let path = self.log_path(entity_type, entity_id);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    entity_type,
                    entity_id: entity_id.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        let mut records = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(line).map_err(|err| {
                StoreError::Corrupted {
                    path: path.display().to_string(),
                    detail: format!("bad record at line {}: {err}", line_no + 1),
                }
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Load the index, falling back to a rebuild from the log when the
    /// index file is corrupt. The log is the source of truth.
    fn load_index_or_rebuild(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> StoreResult<LogIndex> {
        let index_path = self.index_path(entity_type, entity_id);
        match LogIndex::load(&index_path) {
            Ok(index) => Ok(index),
            Err(StoreError::Corrupted { detail, .. }) => {
                warn!(
                    entity_type = %entity_type,
                    entity_id,
                    detail,
                    "index corrupt, rebuilding from log"
                );
                LogIndex::rebuild_from_log(&self.log_path(entity_type, entity_id))
            }
            Err(err) => Err(err),
        }
    }

    fn persist_metadata(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        metadata: &EntityMetadata,
    ) -> StoreResult<()> {
        let bytes = serde_json::to_vec(metadata)?;
        atomic_write(&self.meta_path(entity_type, entity_id), &bytes)
    }
}

/// Validate an entity id for use as a file name stem: non-empty, bounded
/// length, `[A-Za-z0-9._-]` only, and not dot-led (which also rules out
/// `.` and `..`).
fn validate_entity_id(entity_id: &str) -> StoreResult<()> {
    let ok = !entity_id.is_empty()
        && entity_id.len() <= MAX_ENTITY_ID_LEN
        && !entity_id.starts_with('.')
        && entity_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidEntityId(entity_id.to_string()))
    }
}

/// Recursive size of a directory in bytes.
fn dir_size(dir: &Path) -> StoreResult<u64> {
    let mut total = 0u64;
    if !dir.exists() {
        return Ok(0);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += dir_size(&entry.path())?;
        } else if file_type.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}
