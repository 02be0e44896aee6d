//! Bounded LRU cache over decoded entities (spec §4.7).
//!
//! Cache is transparent: callers see repository semantics regardless of
//! hit/miss. TTL is evaluated lazily at lookup time rather than by a
//! background sweeper, in keeping with spec §9's "no package-level
//! state" — there is no thread running behind the caller's back.

use crate::entity::{Entity, EntityId};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

struct CacheSlot {
    entity: Entity,
    inserted_at: Instant,
}

/// Bounded, optionally-TTL'd LRU cache keyed by entity ID.
pub struct EntityCache {
    inner: LruCache<EntityId, CacheSlot>,
    ttl: Option<Duration>,
}

impl EntityCache {
    /// Creates a cache with the given capacity (entity count) and TTL.
    ///
    /// A `capacity` of 0 degrades to an always-miss cache rather than
    /// panicking, since `Config::cache_capacity` is caller-controlled.
    #[must_use]
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or_else(|| NonZeroUsize::new(1).unwrap());
        Self {
            inner: LruCache::new(capacity),
            ttl,
        }
    }

    /// Looks up `id`, evicting it first if it has exceeded the TTL.
    pub fn get(&mut self, id: &EntityId) -> Option<Entity> {
        if let Some(ttl) = self.ttl {
            if let Some(slot) = self.inner.peek(id) {
                if slot.inserted_at.elapsed() > ttl {
                    self.inner.pop(id);
                    return None;
                }
            }
        }
        self.inner.get(id).map(|slot| slot.entity.clone())
    }

    /// Inserts or refreshes an entry.
    pub fn put(&mut self, entity: Entity) {
        self.inner.put(
            entity.id.clone(),
            CacheSlot {
                entity,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Invalidates a single entry (spec §4.7: invalidated on `Update` and
    /// `Delete`).
    pub fn invalidate(&mut self, id: &EntityId) {
        self.inner.pop(id);
    }

    /// Drops every cached entry (used by `ReindexTags`/recovery paths,
    /// where the on-disk state may have changed out from under the
    /// in-memory view).
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Number of entries currently cached (including any not yet lazily
    /// expired).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Tag;

    fn entity(id: &str) -> Entity {
        Entity {
            id: EntityId::from_string(id),
            tags: vec![Tag::new(1, "type:demo")],
            content: Some(b"hi".to_vec()),
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn put_then_get_hits() {
        let mut cache = EntityCache::new(10, None);
        cache.put(entity("e1"));
        assert!(cache.get(&EntityId::from_string("e1")).is_some());
    }

    #[test]
    fn invalidate_evicts() {
        let mut cache = EntityCache::new(10, None);
        let id = EntityId::from_string("e1");
        cache.put(entity("e1"));
        cache.invalidate(&id);
        assert!(cache.get(&id).is_none());
    }

    #[test]
    fn capacity_bound_evicts_lru() {
        let mut cache = EntityCache::new(1, None);
        cache.put(entity("e1"));
        cache.put(entity("e2"));
        assert!(cache.get(&EntityId::from_string("e1")).is_none());
        assert!(cache.get(&EntityId::from_string("e2")).is_some());
    }

    #[test]
    fn ttl_expires_entries() {
        let mut cache = EntityCache::new(10, Some(Duration::from_millis(1)));
        cache.put(entity("e1"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&EntityId::from_string("e1")).is_none());
    }
}
