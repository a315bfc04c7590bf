// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Entity Store
//
// Durable, append-only storage for structured entities directly on a disk
// volume, without a conventional database. Each entity is a per-id record
// log plus a derived offset index and an atomically written lifecycle
// metadata document; reads are served through an in-memory cache with
// explicit invalidation.
//
// # Architecture
//
// - [`types`] -- entity types, attribute values, records, metadata.
// - [`error`] -- the `StoreError` enum covering all failure modes.
// - [`atomic`] -- temp+fsync+rename write primitive and directory fsync.
// - [`lock`] -- RAII per-entity advisory file locks.
// - [`index`] -- CRC32-protected binary offset index, rebuildable from
//   the log.
// - [`cache`] -- in-memory read cache with explicit invalidation.
// - [`store`] -- the `EntityStore` engine tying the above together.
//
// # On-disk layout
//
// ```text
// {root}/{type}/{entity_id}.log    -- append-only record log (JSON lines)
// {root}/{type}/{entity_id}.idx    -- binary offset index
// {root}/{type}/{entity_id}.meta   -- lifecycle metadata document
// {root}/{type}/{entity_id}.lock   -- advisory lock marker
// ```
//
// Record order within a log is append-only and never mutated or reordered;
// the log is the source of truth and the index is a derived accelerator.

pub mod atomic;
pub mod cache;
pub mod error;
pub mod index;
pub mod lock;
pub mod store;
pub mod types;

// Re-export the primary public API for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use index::LogIndex;
pub use lock::EntityLock;
pub use store::EntityStore;
pub use types::{
    fold_records, AttrMap, AttrValue, EntityMetadata, EntityType, EntityView, LifecycleState,
    Record, RecordOp,
};
