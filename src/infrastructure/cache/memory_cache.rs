//! In-memory LRU image cache bounded by total cost and entry count.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{CacheEntry, CacheKey};

struct MemoryNode {
    entry: CacheEntry,
    cost: u64,
    last_access: Instant,
}

struct MemoryState {
    lru: LruCache<CacheKey, MemoryNode>,
    total_cost: u64,
    max_cost: u64,
    max_count: usize,
}

impl MemoryState {
    fn over_budget(&self) -> bool {
        (self.max_cost > 0 && self.total_cost > self.max_cost)
            || (self.max_count > 0 && self.lru.len() > self.max_count)
    }

    /// Evicts least recently used entries until both budgets hold.
    fn evict_to_budget(&mut self) -> usize {
        let mut evicted = 0;
        while self.over_budget() {
            let Some((key, node)) = self.lru.pop_lru() else {
                break;
            };
            self.total_cost -= node.cost;
            evicted += 1;
            trace!(key = %key, cost = node.cost, "Evicted image from memory cache");
        }
        evicted
    }
}

/// In-memory LRU cache for decoded images.
///
/// All operations take one short critical section. Entries with equal
/// recency are evicted in insertion order.
pub struct MemoryImageCache {
    state: Mutex<MemoryState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a new cache. A zero limit disables that budget.
    #[must_use]
    pub fn new(max_cost: u64, max_count: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                lru: LruCache::unbounded(),
                total_cost: 0,
                max_cost,
                max_count,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates an unbounded cache.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(0, 0)
    }

    /// Gets an entry and marks it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut state = self.state.lock();
        if let Some(node) = state.lru.get_mut(key) {
            node.last_access = Instant::now();
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(node.entry.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    /// Peeks at an entry without promoting it in the LRU.
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        let state = self.state.lock();
        state.lru.peek(key).map(|node| node.entry.clone())
    }

    /// Returns when `key` was last read or written.
    pub fn last_access(&self, key: &CacheKey) -> Option<Instant> {
        let state = self.state.lock();
        state.lru.peek(key).map(|node| node.last_access)
    }

    /// Returns true if `key` is resident.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().lru.contains(key)
    }

    /// Stores an entry, evicting least recently used entries while either
    /// budget is exceeded. Returns the number of evicted entries.
    ///
    /// An entry whose cost alone exceeds the cost budget is not stored.
    pub fn put(&self, entry: CacheEntry) -> usize {
        let cost = entry.cost();
        let key = entry.key.clone();
        let mut state = self.state.lock();

        if state.max_cost > 0 && cost > state.max_cost {
            debug!(key = %key, cost, max_cost = state.max_cost, "Image exceeds memory budget, not cached");
            if let Some(old) = state.lru.pop(&key) {
                state.total_cost -= old.cost;
            }
            return 0;
        }

        let node = MemoryNode {
            entry,
            cost,
            last_access: Instant::now(),
        };
        if let Some(old) = state.lru.put(key.clone(), node) {
            state.total_cost -= old.cost;
        }
        state.total_cost += cost;

        let evicted = state.evict_to_budget();
        debug!(key = %key, cost, evicted, "Stored image in memory cache");
        evicted
    }

    /// Removes an entry. Returns true if it was resident.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let mut state = self.state.lock();
        if let Some(node) = state.lru.pop(key) {
            state.total_cost -= node.cost;
            debug!(key = %key, "Removed image from memory cache");
            true
        } else {
            false
        }
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.lru.clear();
        state.total_cost = 0;
        debug!("Cleared memory image cache");
    }

    /// Changes both budgets and evicts down to them.
    pub fn set_limits(&self, max_cost: u64, max_count: usize) {
        let mut state = self.state.lock();
        state.max_cost = max_cost;
        state.max_count = max_count;
        state.evict_to_budget();
    }

    /// Returns the number of resident entries.
    pub fn len(&self) -> usize {
        self.state.lock().lru.len()
    }

    /// Returns true if nothing is resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the summed cost of resident entries.
    pub fn total_cost(&self) -> u64 {
        self.state.lock().total_cost
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let state = self.state.lock();
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: state.lru.len(),
            total_cost: state.total_cost,
        }
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
    /// Summed cost of cached images.
    pub total_cost: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images (cost {}), {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.total_cost, self.hit_rate, self.hits, self.misses
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, size: usize) -> CacheEntry {
        CacheEntry::new(CacheKey::new(key), vec![0u8; size])
    }

    fn key(k: &str) -> CacheKey {
        CacheKey::new(k)
    }

    #[test]
    fn test_cache_put_and_get() {
        let cache = MemoryImageCache::new(0, 10);
        cache.put(entry("test1", 5));

        let retrieved = cache.get(&key("test1"));
        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().byte_size(), 5);
    }

    #[test]
    fn test_cache_miss() {
        let cache = MemoryImageCache::new(0, 10);
        assert!(cache.get(&key("nonexistent")).is_none());
    }

    #[test]
    fn test_count_eviction() {
        let cache = MemoryImageCache::new(0, 2);

        cache.put(entry("test1", 1));
        cache.put(entry("test2", 1));
        let evicted = cache.put(entry("test3", 1));

        // test1 should be evicted (LRU)
        assert_eq!(evicted, 1);
        assert!(cache.get(&key("test1")).is_none());
        assert!(cache.get(&key("test2")).is_some());
        assert!(cache.get(&key("test3")).is_some());
    }

    #[test]
    fn test_cost_eviction_until_under_budget() {
        let cache = MemoryImageCache::new(100, 0);

        cache.put(entry("a", 40));
        cache.put(entry("b", 40));
        cache.put(entry("c", 10));
        assert_eq!(cache.total_cost(), 90);

        // 90 + 70 = 160; dropping a (40) leaves 120, dropping b (40) leaves 80.
        let evicted = cache.put(entry("d", 70));
        assert_eq!(evicted, 2);
        assert!(!cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
        assert!(cache.contains(&key("d")));
        assert_eq!(cache.total_cost(), 80);
    }

    #[test]
    fn test_access_protects_from_eviction() {
        let cache = MemoryImageCache::new(100, 0);

        cache.put(entry("a", 40));
        cache.put(entry("b", 40));
        assert!(cache.get(&key("a")).is_some());

        cache.put(entry("c", 40));
        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
    }

    #[test]
    fn test_bulk_insert_evicts_in_insertion_order() {
        let cache = MemoryImageCache::new(0, 3);
        for i in 0..6 {
            cache.put(entry(&format!("k{i}"), 1));
        }
        for i in 0..3 {
            assert!(!cache.contains(&key(&format!("k{i}"))));
        }
        for i in 3..6 {
            assert!(cache.contains(&key(&format!("k{i}"))));
        }
    }

    #[test]
    fn test_replace_updates_cost() {
        let cache = MemoryImageCache::new(0, 0);
        cache.put(entry("a", 40));
        cache.put(entry("a", 10));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_cost(), 10);
    }

    #[test]
    fn test_oversized_entry_not_cached() {
        let cache = MemoryImageCache::new(10, 0);
        cache.put(entry("small", 5));
        cache.put(entry("huge", 50));
        assert!(!cache.contains(&key("huge")));
        assert!(cache.contains(&key("small")));
        assert_eq!(cache.total_cost(), 5);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = MemoryImageCache::unbounded();
        cache.put(entry("a", 3));
        cache.put(entry("b", 4));

        assert!(cache.remove(&key("a")));
        assert!(!cache.remove(&key("a")));
        assert_eq!(cache.total_cost(), 4);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_cost(), 0);
    }

    #[test]
    fn test_set_limits_evicts() {
        let cache = MemoryImageCache::unbounded();
        for i in 0..5 {
            cache.put(entry(&format!("k{i}"), 1));
        }
        cache.set_limits(0, 2);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&key("k4")));
    }

    #[test]
    fn test_cache_stats() {
        let cache = MemoryImageCache::new(0, 10);
        cache.put(entry("test1", 2));

        // Hit
        let _ = cache.get(&key("test1"));
        // Miss
        let _ = cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.total_cost, 2);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let cache = MemoryImageCache::new(0, 2);

        cache.put(entry("test1", 1));
        cache.put(entry("test2", 1));

        // Peek at test1 (should not promote it)
        let _ = cache.peek(&key("test1"));

        // Add test3, should evict test1 (since peek doesn't promote)
        cache.put(entry("test3", 1));

        assert!(cache.peek(&key("test1")).is_none());
    }

    #[test]
    fn test_get_refreshes_last_access() {
        let cache = MemoryImageCache::unbounded();
        cache.put(entry("a", 1));
        let first = cache.last_access(&key("a")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let _ = cache.get(&key("a"));
        assert!(cache.last_access(&key("a")).unwrap() > first);
    }
}
