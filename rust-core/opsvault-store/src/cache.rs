// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Entity Store - In-memory read cache
//
// Caches materialized entity views and per-type entity counts so repeated
// reads never touch the disk. Invalidation is explicit: write paths
// invalidate the entity they touched, and `invalidate_all` drops everything
// (used after out-of-process mutation or to simulate a restart). Cached
// reads may be stale relative to a writer in another process; that is the
// accepted trade-off.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::types::{EntityType, EntityView};

/// Process-local read cache keyed by `(entity_type, entity_id)`.
#[derive(Debug, Default)]
pub struct ReadCache {
    entities: RwLock<HashMap<(EntityType, String), Arc<EntityView>>>,
    counts: RwLock<HashMap<EntityType, usize>>,
}

impl ReadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached view for an entity, if present.
    pub fn get(&self, entity_type: EntityType, entity_id: &str) -> Option<Arc<EntityView>> {
        let entities = self.entities.read().expect("read cache lock");
        entities
            .get(&(entity_type, entity_id.to_string()))
            .cloned()
    }

    /// Insert or replace the cached view for an entity.
    pub fn put(&self, entity_type: EntityType, entity_id: &str, view: Arc<EntityView>) {
        let mut entities = self.entities.write().expect("read cache lock");
        entities.insert((entity_type, entity_id.to_string()), view);
    }

    /// Cached entity count for a type, if present.
    pub fn get_count(&self, entity_type: EntityType) -> Option<usize> {
        let counts = self.counts.read().expect("count cache lock");
        counts.get(&entity_type).copied()
    }

    /// Cache the entity count for a type.
    pub fn put_count(&self, entity_type: EntityType, count: usize) {
        let mut counts = self.counts.write().expect("count cache lock");
        counts.insert(entity_type, count);
    }

    /// Drop the cached view for one entity and the count tally for its type.
    pub fn invalidate(&self, entity_type: EntityType, entity_id: &str) {
        {
            let mut entities = self.entities.write().expect("read cache lock");
            entities.remove(&(entity_type, entity_id.to_string()));
        }
        let mut counts = self.counts.write().expect("count cache lock");
        counts.remove(&entity_type);
    }

    /// Drop every cached view and tally, forcing the next read to re-derive
    /// state from disk.
    pub fn invalidate_all(&self) {
        self.entities.write().expect("read cache lock").clear();
        self.counts.write().expect("count cache lock").clear();
    }

    /// Number of cached entity views (test and introspection aid).
    pub fn cached_entities(&self) -> usize {
        self.entities.read().expect("read cache lock").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttrMap;

    fn view() -> Arc<EntityView> {
        Arc::new(EntityView {
            latest: AttrMap::new(),
            records: Vec::new(),
        })
    }

    #[test]
    fn test_get_miss_then_hit() {
        let cache = ReadCache::new();
        assert!(cache.get(EntityType::Users, "u1").is_none());
        cache.put(EntityType::Users, "u1", view());
        assert!(cache.get(EntityType::Users, "u1").is_some());
    }

    #[test]
    fn test_keys_are_type_scoped() {
        let cache = ReadCache::new();
        cache.put(EntityType::Users, "x", view());
        assert!(cache.get(EntityType::Sessions, "x").is_none());
    }

    #[test]
    fn test_invalidate_entity_drops_count() {
        let cache = ReadCache::new();
        cache.put(EntityType::Users, "u1", view());
        cache.put_count(EntityType::Users, 7);

        cache.invalidate(EntityType::Users, "u1");
        assert!(cache.get(EntityType::Users, "u1").is_none());
        assert!(cache.get_count(EntityType::Users).is_none());
    }

    #[test]
    fn test_invalidate_all() {
        let cache = ReadCache::new();
        cache.put(EntityType::Users, "u1", view());
        cache.put(EntityType::Targets, "t1", view());
        cache.put_count(EntityType::Targets, 1);

        cache.invalidate_all();
        assert_eq!(cache.cached_entities(), 0);
        assert!(cache.get_count(EntityType::Targets).is_none());
    }
}
