// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Entity Store - Core data types
//
// Defines the closed set of entity types, the attribute value model used by
// entity payloads, the append-only record structure, and the lifecycle
// metadata document. The materialized ("latest") view of an entity is the
// left-fold of its records in append order.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// EntityType
// ---------------------------------------------------------------------------

/// The closed set of entity categories the engine persists.
///
/// Each variant maps 1:1 to a directory under the storage root. The set is
/// closed on purpose: callers cannot invent new on-disk subtrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Users,
    Sessions,
    Devices,
    Targets,
    Reports,
    Videos,
    Training,
    Audit,
    Backups,
    Indexes,
}

impl EntityType {
    /// All entity types, in on-disk directory order.
    pub const ALL: [EntityType; 10] = [
        EntityType::Users,
        EntityType::Sessions,
        EntityType::Devices,
        EntityType::Targets,
        EntityType::Reports,
        EntityType::Videos,
        EntityType::Training,
        EntityType::Audit,
        EntityType::Backups,
        EntityType::Indexes,
    ];

    /// The directory name for this entity type under the storage root.
    pub fn dir_name(self) -> &'static str {
        match self {
            EntityType::Users => "users",
            EntityType::Sessions => "sessions",
            EntityType::Devices => "devices",
            EntityType::Targets => "targets",
            EntityType::Reports => "reports",
            EntityType::Videos => "videos",
            EntityType::Training => "training",
            EntityType::Audit => "audit",
            EntityType::Backups => "backups",
            EntityType::Indexes => "indexes",
        }
    }

    /// Resolve a directory name back to an entity type.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.dir_name() == name)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

// ---------------------------------------------------------------------------
// Attribute values
// ---------------------------------------------------------------------------

/// An ordered attribute mapping. `BTreeMap` keeps key order stable so the
/// serialized form of a payload is deterministic.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// One attribute value. A small closed set of kinds rather than arbitrary
/// JSON: strings, integers, floats, booleans, and nested maps.
///
/// The untagged representation keeps the on-disk JSON plain: `{"name":"A",
/// "port":443,"active":true}`. Variant order matters for deserialization
/// (`Bool` before `Int` before `Num`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Num(f64),
    Str(String),
    Map(AttrMap),
}

impl AttrValue {
    /// Returns the string slice if this value is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this value is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean if this value is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Int(n)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Num(n)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// The operation recorded by one log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordOp {
    /// The first record of an entity's log.
    Create,
    /// Every subsequent record.
    Update,
}

impl fmt::Display for RecordOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordOp::Create => f.write_str("CREATE"),
            RecordOp::Update => f.write_str("UPDATE"),
        }
    }
}

/// One immutable append to an entity's log: an operation tag, a point-in-time
/// attribute delta, and the append timestamp. Serialized as a single JSON
/// object per log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub op: RecordOp,
    pub timestamp: DateTime<Utc>,
    pub attributes: AttrMap,
}

impl Record {
    /// Build a record stamped with the current time.
    pub fn new(op: RecordOp, attributes: AttrMap) -> Self {
        Self {
            op,
            timestamp: Utc::now(),
            attributes,
        }
    }
}

/// Fold records in append order into the materialized attribute view.
/// Later keys overwrite earlier ones; folding is shallow.
pub fn fold_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> AttrMap {
    let mut latest = AttrMap::new();
    for record in records {
        for (key, value) in &record.attributes {
            latest.insert(key.clone(), value.clone());
        }
    }
    latest
}

/// The materialized state of one entity: the folded latest view plus the
/// full ordered record list backing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityView {
    pub latest: AttrMap,
    pub records: Vec<Record>,
}

// ---------------------------------------------------------------------------
// Lifecycle metadata
// ---------------------------------------------------------------------------

/// Retention-governance status of an entity, distinct from its data content.
/// `Deleted` is terminal. The transition table lives in the lifecycle crate;
/// the store only persists the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Created,
    Active,
    Completed,
    BackedUp,
    MarkedForDeletion,
    Deleted,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "CREATED",
            LifecycleState::Active => "ACTIVE",
            LifecycleState::Completed => "COMPLETED",
            LifecycleState::BackedUp => "BACKED_UP",
            LifecycleState::MarkedForDeletion => "MARKED_FOR_DELETION",
            LifecycleState::Deleted => "DELETED",
        };
        f.write_str(name)
    }
}

/// The per-entity metadata document, one per `.meta` file.
///
/// Owned and mutated exclusively by the lifecycle manager; the store only
/// provides the atomic read/write primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub lifecycle_state: LifecycleState,
    pub created_at: DateTime<Utc>,
    pub backup_verified: bool,
    pub integrity_verified: bool,
    pub legal_hold: bool,
    #[serde(default)]
    pub attributes: AttrMap,
}

impl EntityMetadata {
    /// Fresh metadata for a newly created entity.
    pub fn new() -> Self {
        Self {
            lifecycle_state: LifecycleState::Created,
            created_at: Utc::now(),
            backup_verified: false,
            integrity_verified: false,
            legal_hold: false,
            attributes: AttrMap::new(),
        }
    }

    /// Whole days elapsed since `created_at`.
    pub fn age_days(&self) -> i64 {
        (Utc::now() - self.created_at).num_days()
    }
}

impl Default for EntityMetadata {
    fn default() -> Self {
        Self::new()
    }
}
