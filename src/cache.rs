//! Recency-ranked lookup cache in front of [`PathIndex`].
//!
//! A fixed handful of slots scanned linearly: the hot-path set is tiny
//! compared to the namespace, so an O(capacity) scan beats a map. Rank 0
//! is most recent; every resolve ages all slots by one and the largest
//! rank is the eviction victim.

use crate::index::PathIndex;
use crate::registry::ServerId;

/// Default slot count. Small on purpose: the cache is a routing
/// accelerator, not a data cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 5;

const HASH_BASE: u64 = 257;
const HASH_PRIME: u64 = 1_000_000_007;

/// Polynomial rolling hash of the full path, modulo a large prime.
pub fn path_hash(path: &str) -> u64 {
    path.bytes()
        .fold(0u64, |hash, byte| (hash * HASH_BASE + u64::from(byte)) % HASH_PRIME)
}

struct CacheSlot {
    hash: u64,
    result: Option<ServerId>,
    rank: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct LookupCache {
    slots: Vec<CacheSlot>,
    capacity: usize,
    stats: CacheStats,
}

impl LookupCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            stats: CacheStats::default(),
        }
    }

    /// Resolves `path` through the cache, falling back to `index` on a
    /// miss and caching whatever the index said (negative results
    /// included).
    ///
    /// The cache is never invalidated out of band: a path reassigned or
    /// deleted after being cached is served stale until rank decay evicts
    /// it. Accepted trade-off for a cache this small.
    pub fn resolve(&mut self, path: &str, index: &PathIndex) -> Option<ServerId> {
        let hash = path_hash(path);
        for slot in &mut self.slots {
            slot.rank = slot.rank.saturating_add(1);
        }
        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.hash == hash) {
            slot.rank = 0;
            self.stats.hits += 1;
            return slot.result;
        }
        let result = index.search(path);
        self.stats.misses += 1;
        if self.slots.len() < self.capacity {
            self.slots.push(CacheSlot {
                hash,
                result,
                rank: 0,
            });
        } else if let Some(victim) = self.slots.iter_mut().max_by_key(|slot| slot.rank) {
            victim.hash = hash;
            victim.result = result;
            victim.rank = 0;
        }
        result
    }

    /// Occupied slot count; never exceeds the configured capacity.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether `path` currently occupies a slot, without touching ranks.
    pub fn holds(&self, path: &str) -> bool {
        let hash = path_hash(path);
        self.slots.iter().any(|slot| slot.hash == hash)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u16) -> ServerId {
        ServerId::new(raw)
    }

    fn seeded_index() -> PathIndex {
        let mut index = PathIndex::new();
        for (path, server) in [
            ("/a", 1),
            ("/b", 2),
            ("/c", 3),
            ("/d", 4),
            ("/e", 5),
            ("/f", 6),
        ] {
            index.insert(path, id(server));
        }
        index
    }

    #[test]
    fn miss_matches_index_at_time_of_call() {
        let index = seeded_index();
        let mut cache = LookupCache::new(DEFAULT_CACHE_CAPACITY);
        assert_eq!(cache.resolve("/a", &index), index.search("/a"));
        assert_eq!(cache.resolve("/missing", &index), None);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn hit_skips_the_index() {
        let mut index = seeded_index();
        let mut cache = LookupCache::new(DEFAULT_CACHE_CAPACITY);
        assert_eq!(cache.resolve("/a", &index), Some(id(1)));
        // Reassignment after caching is not observed until eviction.
        index.insert("/a", id(2));
        assert_eq!(cache.resolve("/a", &index), Some(id(1)));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn capacity_bound_holds() {
        let index = seeded_index();
        let mut cache = LookupCache::new(3);
        for path in ["/a", "/b", "/c", "/d", "/e", "/f"] {
            cache.resolve(path, &index);
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn most_recent_path_survives_eviction() {
        let index = seeded_index();
        let mut cache = LookupCache::new(3);
        for path in ["/a", "/b", "/c", "/d", "/e", "/f"] {
            cache.resolve(path, &index);
            assert!(cache.holds(path));
        }
    }

    #[test]
    fn least_recently_used_is_evicted_first() {
        let index = seeded_index();
        let mut cache = LookupCache::new(2);
        cache.resolve("/a", &index);
        cache.resolve("/b", &index);
        // Touch /a so /b becomes the oldest.
        cache.resolve("/a", &index);
        cache.resolve("/c", &index);
        assert!(cache.holds("/a"));
        assert!(cache.holds("/c"));
        assert!(!cache.holds("/b"));
    }

    #[test]
    fn negative_results_are_cached() {
        let index = seeded_index();
        let mut cache = LookupCache::new(2);
        assert_eq!(cache.resolve("/missing", &index), None);
        assert_eq!(cache.resolve("/missing", &index), None);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }
}
