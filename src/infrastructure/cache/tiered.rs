//! Memory plus disk cache with a single lookup/store surface.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::disk_cache::{DiskImageCache, RetentionPolicy, SweepReport};
use super::memory_cache::{CacheStats, MemoryImageCache};
use crate::domain::entities::{CacheEntry, CacheKey, ImageSource};
use crate::domain::errors::CacheResult;
use crate::infrastructure::codec;
use crate::infrastructure::config::CacheConfig;

/// Completion of a background disk write or delete.
///
/// Dropping it leaves the operation running.
#[derive(Debug)]
pub struct DiskWrite(Option<JoinHandle<()>>);

impl DiskWrite {
    fn done() -> Self {
        Self(None)
    }

    /// Waits until the disk operation has finished.
    pub async fn finished(self) {
        if let Some(handle) = self.0
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Disk cache task failed");
        }
    }
}

/// Number of stripes ordering background disk operations.
const DISK_ORDER_STRIPES: usize = 64;

/// Runs background disk operations on the same key in the order they were
/// issued.
///
/// Each stripe remembers the completion signal of its most recent operation.
/// A new operation swaps in its own signal and waits for the previous one, so
/// a `remove` issued after a `store` cannot be overtaken by it.
struct DiskOrder {
    tails: Vec<Mutex<Option<oneshot::Receiver<()>>>>,
}

/// Completion signal of one ordered operation. Dropping it releases the next
/// operation on the stripe, also when the task is aborted.
struct OrderTicket {
    previous: Option<oneshot::Receiver<()>>,
    _done: oneshot::Sender<()>,
}

impl OrderTicket {
    async fn wait_turn(&mut self) {
        if let Some(previous) = self.previous.take() {
            // Err only means the predecessor finished by dropping its sender.
            let _ = previous.await;
        }
    }
}

impl DiskOrder {
    fn new() -> Self {
        Self {
            tails: (0..DISK_ORDER_STRIPES).map(|_| Mutex::new(None)).collect(),
        }
    }

    fn enqueue(&self, key: &CacheKey) -> OrderTicket {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        #[allow(clippy::cast_possible_truncation)]
        let idx = (hasher.finish() as usize) % self.tails.len();

        let (done, tail) = oneshot::channel();
        let previous = self.tails[idx].lock().replace(tail);
        OrderTicket {
            previous,
            _done: done,
        }
    }
}

/// Two-tier image cache.
///
/// The memory tier answers synchronously. The disk tier runs on the tokio
/// blocking pool and never fails a caller: I/O errors are logged and become
/// misses.
pub struct TieredCache {
    memory: MemoryImageCache,
    disk: Arc<DiskImageCache>,
    disk_order: DiskOrder,
    config: CacheConfig,
}

impl TieredCache {
    /// Creates a cache whose writable path is `config.disk_cache_path()`.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be created.
    pub async fn new(config: CacheConfig) -> CacheResult<Self> {
        let retention = RetentionPolicy {
            max_age: config.max_age(),
            max_total_bytes: config.max_cache_size_bytes,
        };
        let disk =
            DiskImageCache::new(config.disk_cache_path(), retention, config.disable_backup).await?;
        Ok(Self::with_disk(config, Arc::new(disk)))
    }

    /// Creates a cache around an existing disk store.
    #[must_use]
    pub fn with_disk(config: CacheConfig, disk: Arc<DiskImageCache>) -> Self {
        let memory = MemoryImageCache::new(config.max_memory_cost, config.max_memory_count);
        Self {
            memory,
            disk,
            disk_order: DiskOrder::new(),
            config,
        }
    }

    /// Returns the cache configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the disk store.
    #[must_use]
    pub fn disk(&self) -> &Arc<DiskImageCache> {
        &self.disk
    }

    /// Looks up the memory tier and refreshes the entry's recency.
    pub fn lookup_memory(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.memory.get(key)
    }

    /// Looks up the writable path, then each read-only path.
    ///
    /// Decodes the bytes when decoding is enabled; a file that fails to
    /// decode is a miss. Does not touch the memory tier.
    pub async fn lookup_disk(&self, key: &CacheKey) -> Option<CacheEntry> {
        let data = self.disk.get_bytes(key).await?;
        let entry = CacheEntry::new(key.clone(), data);

        if !self.config.decode_images {
            return Some(entry);
        }

        match codec::decode(entry.data.clone()).await {
            Ok(img) => {
                debug!(key = %key, "Decoded image from disk cache");
                Some(entry.with_decoded(Arc::new(img)))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to decode cached image");
                None
            }
        }
    }

    /// Memory first, then disk. A disk hit is promoted into memory.
    pub async fn lookup(&self, key: &CacheKey) -> Option<(CacheEntry, ImageSource)> {
        if let Some(entry) = self.lookup_memory(key) {
            return Some((entry, ImageSource::MemoryCache));
        }

        let entry = self.lookup_disk(key).await?;
        if self.config.should_cache_in_memory {
            self.memory.put(entry.clone());
        }
        Some((entry, ImageSource::DiskCache))
    }

    /// Stores `entry` in memory and, if `to_disk`, persists its encoded bytes
    /// in the background.
    ///
    /// Disk writes and deletes of one key take effect in call order. Must be
    /// called inside a tokio runtime when `to_disk` is set.
    pub fn store(&self, entry: CacheEntry, to_disk: bool) -> DiskWrite {
        let write = if to_disk && !entry.data.is_empty() {
            let disk = self.disk.clone();
            let key = entry.key.clone();
            let data = entry.data.clone();
            let mut ticket = self.disk_order.enqueue(&key);
            DiskWrite(Some(tokio::spawn(async move {
                ticket.wait_turn().await;
                if let Err(e) = disk.put_bytes(&key, &data).await {
                    warn!(key = %key, error = %e, "Failed to cache to disk");
                }
            })))
        } else {
            DiskWrite::done()
        };

        if self.config.should_cache_in_memory {
            self.memory.put(entry);
        }
        write
    }

    /// Removes `key` from memory and, if `from_disk`, deletes it from the
    /// writable path in the background.
    pub fn remove(&self, key: &CacheKey, from_disk: bool) -> DiskWrite {
        self.memory.remove(key);
        if !from_disk {
            return DiskWrite::done();
        }

        let disk = self.disk.clone();
        let key = key.clone();
        let mut ticket = self.disk_order.enqueue(&key);
        DiskWrite(Some(tokio::spawn(async move {
            ticket.wait_turn().await;
            if let Err(e) = disk.remove(&key).await {
                warn!(key = %key, error = %e, "Failed to evict from disk cache");
            }
        })))
    }

    /// Drops the whole memory tier.
    pub fn clear_memory(&self) {
        self.memory.clear();
    }

    /// Host memory-pressure signal: releases the memory tier.
    pub fn handle_memory_pressure(&self) {
        let released = self.memory.len();
        self.memory.clear();
        info!(released, "Memory pressure, cleared memory image cache");
    }

    /// Deletes every entry in the writable path. Returns the number removed.
    pub async fn clear_disk(&self) -> usize {
        self.disk.clear().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to clear disk cache");
            0
        })
    }

    /// Applies the retention policy to the writable path.
    pub async fn sweep_expired(&self) -> SweepReport {
        self.disk.sweep().await.unwrap_or_else(|e| {
            warn!(error = %e, "Disk cache sweep failed");
            SweepReport::default()
        })
    }

    /// Sweeps the writable path every `period` until the cache is dropped.
    ///
    /// The first sweep runs one period after the call. The task holds only a
    /// weak reference, so it ends on the first tick after the last `Arc` is
    /// gone. A zero period is raised to one second.
    pub fn spawn_maintenance(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let period = period.max(Duration::from_secs(1));
        let cache = Arc::downgrade(self);
        debug!(period_secs = period.as_secs(), "Disk cache maintenance started");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    debug!("Cache dropped, maintenance stopped");
                    break;
                };
                let report = cache.sweep_expired().await;
                trace!(
                    removed = report.removed_count,
                    freed_bytes = report.freed_bytes,
                    "Scheduled disk cache sweep"
                );
            }
        })
    }

    /// Returns `(count, bytes)` of the writable path.
    pub async fn calculate_size(&self) -> (usize, u64) {
        self.disk.calculate_size().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to calculate disk cache size");
            (0, 0)
        })
    }

    /// Total bytes in the writable path. Walks the directory.
    pub async fn size_on_disk(&self) -> u64 {
        self.calculate_size().await.1
    }

    /// Number of entries in the writable path. Walks the directory.
    pub async fn count_on_disk(&self) -> usize {
        self.calculate_size().await.0
    }

    /// Checks the disk tier for `key` without reading it.
    pub async fn disk_exists(&self, key: &CacheKey) -> bool {
        let exists = self.disk.contains(key).await;
        trace!(key = %key, exists, "Disk existence check");
        exists
    }

    /// Returns true if `key` is resident in memory.
    pub fn memory_contains(&self, key: &CacheKey) -> bool {
        self.memory.contains(key)
    }

    /// Registers a read-only search path.
    pub fn add_read_only_path(&self, path: impl Into<PathBuf>) {
        self.disk.add_read_only_path(path);
    }

    /// Returns the file path `key` maps to under `root`.
    #[must_use]
    pub fn cache_path_for_key(key: &CacheKey, root: &Path) -> PathBuf {
        DiskImageCache::cache_path_in(key, root)
    }

    /// Returns the file path `key` maps to in the writable directory.
    #[must_use]
    pub fn default_cache_path_for_key(&self, key: &CacheKey) -> PathBuf {
        self.disk.cache_path(key)
    }

    /// Returns memory tier statistics.
    #[must_use]
    pub fn memory_stats(&self) -> CacheStats {
        self.memory.stats()
    }
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("config", &self.config)
            .field("disk", &self.disk)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::disk_cache::test_support::set_age;
    use super::*;
    use crate::infrastructure::codec::test_support::png_bytes;
    use tempfile::TempDir;

    fn test_config(temp: &TempDir) -> CacheConfig {
        CacheConfig {
            root_dir: Some(temp.path().to_path_buf()),
            namespace: "test".to_string(),
            ..CacheConfig::default()
        }
    }

    async fn create_test_cache(config: CacheConfig) -> TieredCache {
        TieredCache::new(config).await.unwrap()
    }

    fn png_entry(key: &str) -> CacheEntry {
        CacheEntry::new(CacheKey::new(key), png_bytes(8, 8))
    }

    #[tokio::test]
    async fn test_round_trip_through_disk() {
        let temp = TempDir::new().unwrap();
        let cache = create_test_cache(test_config(&temp)).await;
        let entry = png_entry("https://x/a.png");
        let original = entry.data.clone();

        cache.store(entry, true).finished().await;
        cache.clear_memory();
        assert!(cache.lookup_memory(&CacheKey::new("https://x/a.png")).is_none());

        let (found, source) = cache.lookup(&CacheKey::new("https://x/a.png")).await.unwrap();
        assert_eq!(source, ImageSource::DiskCache);
        assert_eq!(found.data, original);
        assert_eq!(found.dimensions(), Some((8, 8)));

        // Promoted into memory.
        let (_, source) = cache.lookup(&CacheKey::new("https://x/a.png")).await.unwrap();
        assert_eq!(source, ImageSource::MemoryCache);
    }

    #[tokio::test]
    async fn test_store_memory_only() {
        let temp = TempDir::new().unwrap();
        let cache = create_test_cache(test_config(&temp)).await;
        let key = CacheKey::new("k");

        cache.store(png_entry("k"), false).finished().await;
        assert!(cache.lookup_memory(&key).is_some());
        assert!(!cache.disk_exists(&key).await);
        assert_eq!(cache.count_on_disk().await, 0);
    }

    #[tokio::test]
    async fn test_memory_disabled() {
        let temp = TempDir::new().unwrap();
        let config = CacheConfig {
            should_cache_in_memory: false,
            ..test_config(&temp)
        };
        let cache = create_test_cache(config).await;
        let key = CacheKey::new("k");

        cache.store(png_entry("k"), true).finished().await;
        assert!(cache.lookup_memory(&key).is_none());
        let (_, source) = cache.lookup(&key).await.unwrap();
        assert_eq!(source, ImageSource::DiskCache);
        assert!(!cache.memory_contains(&key));
    }

    #[tokio::test]
    async fn test_lookup_disk_without_decoding() {
        let temp = TempDir::new().unwrap();
        let config = CacheConfig {
            decode_images: false,
            ..test_config(&temp)
        };
        let cache = create_test_cache(config).await;
        let key = CacheKey::new("k");

        cache.store(png_entry("k"), true).finished().await;
        let entry = cache.lookup_disk(&key).await.unwrap();
        assert!(entry.decoded.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_disk_file_is_a_miss() {
        let temp = TempDir::new().unwrap();
        let cache = create_test_cache(test_config(&temp)).await;
        let key = CacheKey::new("k");
        std::fs::write(cache.default_cache_path_for_key(&key), b"not an image").unwrap();

        assert!(cache.lookup(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_from_disk() {
        let temp = TempDir::new().unwrap();
        let cache = create_test_cache(test_config(&temp)).await;
        let key = CacheKey::new("k");

        cache.store(png_entry("k"), true).finished().await;
        cache.remove(&key, false).finished().await;
        assert!(cache.lookup_memory(&key).is_none());
        assert!(cache.disk_exists(&key).await);

        cache.remove(&key, true).finished().await;
        assert!(!cache.disk_exists(&key).await);
        assert!(cache.lookup(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_read_only_path_found_and_never_deleted() {
        let temp = TempDir::new().unwrap();
        let config = CacheConfig {
            max_cache_age_seconds: 60,
            ..test_config(&temp)
        };
        let cache = create_test_cache(config).await;
        let key = CacheKey::new("bundled");

        let bundle = temp.path().join("bundle");
        std::fs::create_dir_all(&bundle).unwrap();
        let seeded = TieredCache::cache_path_for_key(&key, &bundle);
        std::fs::write(&seeded, png_bytes(2, 2)).unwrap();
        set_age(&seeded, Duration::from_secs(3600));
        cache.add_read_only_path(&bundle);

        assert!(cache.lookup_disk(&key).await.is_some());

        cache.remove(&key, true).finished().await;
        cache.sweep_expired().await;
        assert_eq!(cache.clear_disk().await, 0);
        assert!(seeded.exists());
    }

    #[tokio::test]
    async fn test_sweep_and_size() {
        let temp = TempDir::new().unwrap();
        let config = CacheConfig {
            max_cache_age_seconds: 60,
            ..test_config(&temp)
        };
        let cache = create_test_cache(config).await;

        let old = png_entry("old");
        let old_size = old.byte_size();
        cache.store(old, true).finished().await;
        cache.store(png_entry("new"), true).finished().await;
        set_age(
            &cache.default_cache_path_for_key(&CacheKey::new("old")),
            Duration::from_secs(120),
        );

        assert_eq!(cache.count_on_disk().await, 2);
        let report = cache.sweep_expired().await;
        assert_eq!(report.removed_count, 1);
        assert_eq!(report.freed_bytes, old_size);
        assert_eq!(cache.count_on_disk().await, 1);
        assert!(cache.disk_exists(&CacheKey::new("new")).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_remove_after_store_is_never_undone() {
        let temp = TempDir::new().unwrap();
        let cache = create_test_cache(test_config(&temp)).await;
        let data = png_bytes(2, 2);

        let mut pending = Vec::new();
        for i in 0..200 {
            let key = CacheKey::new(format!("https://x/{i}.png"));
            let write = cache.store(CacheEntry::new(key.clone(), data.clone()), true);
            let delete = cache.remove(&key, true);
            pending.push((key, write, delete));
        }

        let mut resurrected = 0;
        for (key, write, delete) in pending {
            write.finished().await;
            delete.finished().await;
            if cache.disk_exists(&key).await {
                resurrected += 1;
            }
        }
        assert_eq!(resurrected, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_store_after_remove_persists() {
        let temp = TempDir::new().unwrap();
        let cache = create_test_cache(test_config(&temp)).await;
        let key = CacheKey::new("k");
        cache.store(png_entry("k"), true).finished().await;

        let delete = cache.remove(&key, true);
        let write = cache.store(png_entry("k"), true);
        delete.finished().await;
        write.finished().await;

        assert!(cache.disk_exists(&key).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_sweeps_each_period() {
        let temp = TempDir::new().unwrap();
        let config = CacheConfig {
            max_cache_age_seconds: 60,
            ..test_config(&temp)
        };
        let cache = Arc::new(create_test_cache(config).await);
        let key = CacheKey::new("old");
        cache.store(png_entry("old"), true).finished().await;
        let path = cache.default_cache_path_for_key(&key);
        set_age(&path, Duration::from_secs(120));

        let period = Duration::from_secs(600);
        let task = cache.spawn_maintenance(period);

        tokio::time::sleep(period / 2).await;
        assert!(path.exists());

        for _ in 0..10 {
            if !path.exists() {
                break;
            }
            tokio::time::sleep(period).await;
        }
        assert!(!path.exists());
        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_stops_when_cache_dropped() {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(create_test_cache(test_config(&temp)).await);
        let period = Duration::from_secs(60);

        let task = cache.spawn_maintenance(period);
        drop(cache);
        tokio::time::sleep(period * 2).await;

        assert!(task.is_finished());
    }

    #[tokio::test]
    async fn test_memory_pressure_clears_memory_only() {
        let temp = TempDir::new().unwrap();
        let cache = create_test_cache(test_config(&temp)).await;
        let key = CacheKey::new("k");

        cache.store(png_entry("k"), true).finished().await;
        cache.handle_memory_pressure();

        assert_eq!(cache.memory_stats().size, 0);
        assert!(cache.disk_exists(&key).await);
    }
}
