//! Disk-based image cache for persistence across sessions.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::domain::entities::{CacheKey, DISK_ENTRY_EXTENSION};
use crate::domain::errors::{CacheError, CacheResult};

/// Number of lock stripes serializing writes to the same file.
const WRITE_LOCK_STRIPES: usize = 64;

/// Suffix of in-progress writes. Never read as entries.
const TEMP_FILE_SUFFIX: &str = ".tmp";

/// Temporary files older than this are leftovers of interrupted writes.
const STALE_TEMP_FILE_AGE: Duration = Duration::from_secs(60 * 60);

/// Marker file recognised by backup tools (borg, restic, tar --exclude-caches).
const CACHEDIR_TAG_NAME: &str = "CACHEDIR.TAG";
const CACHEDIR_TAG_CONTENT: &str = "Signature: 8a477f597d28d172789f06886806bc55\n\
# This file is a cache directory tag created by webimage.\n\
# For information about cache directory tags see https://bford.info/cachedir/\n";

/// Age and size limits applied to the writable path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Entries older than this are removed. `None` disables expiry.
    pub max_age: Option<Duration>,
    /// Total size budget in bytes. 0 disables the limit.
    pub max_total_bytes: u64,
}

/// Result of a retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Number of files deleted.
    pub removed_count: usize,
    /// Bytes released.
    pub freed_bytes: u64,
}

struct DiskFile {
    path: PathBuf,
    modified: SystemTime,
    size: u64,
}

#[derive(Default)]
struct Listing {
    entries: Vec<DiskFile>,
    temp_files: Vec<DiskFile>,
}

/// Disk-based image cache that persists raw image bytes.
///
/// One writable directory plus any number of read-only search paths. Read-only
/// paths are consulted on a miss and never written, removed or swept.
pub struct DiskImageCache {
    cache_dir: PathBuf,
    read_only_paths: RwLock<Vec<PathBuf>>,
    retention: RwLock<RetentionPolicy>,
    write_locks: Vec<Mutex<()>>,
}

impl DiskImageCache {
    /// Creates a new disk cache in the specified directory.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be created.
    pub async fn new(
        cache_dir: PathBuf,
        retention: RetentionPolicy,
        disable_backup: bool,
    ) -> CacheResult<Self> {
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| CacheError::io(&cache_dir, e))?;

        if disable_backup {
            let tag = cache_dir.join(CACHEDIR_TAG_NAME);
            if !fs::try_exists(&tag).await.unwrap_or(false)
                && let Err(e) = fs::write(&tag, CACHEDIR_TAG_CONTENT).await
            {
                warn!(path = %tag.display(), error = %e, "Failed to write cache directory tag");
            }
        }

        Ok(Self {
            cache_dir,
            read_only_paths: RwLock::new(Vec::new()),
            retention: RwLock::new(retention),
            write_locks: (0..WRITE_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        })
    }

    /// Returns the writable directory.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the retention policy.
    pub fn retention(&self) -> RetentionPolicy {
        *self.retention.read()
    }

    /// Replaces the retention policy used by the next sweep.
    pub fn set_retention(&self, retention: RetentionPolicy) {
        *self.retention.write() = retention;
    }

    /// Adds a read-only search path, consulted after the writable path and
    /// after previously added read-only paths.
    pub fn add_read_only_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!(path = %path.display(), "Added read-only cache path");
        self.read_only_paths.write().push(path);
    }

    /// Returns the read-only search paths in registration order.
    pub fn read_only_paths(&self) -> Vec<PathBuf> {
        self.read_only_paths.read().clone()
    }

    /// Returns the path `key` is stored under inside `root`.
    #[must_use]
    pub fn cache_path_in(key: &CacheKey, root: &Path) -> PathBuf {
        root.join(key.file_name())
    }

    /// Returns the path for a cached image in the writable directory.
    #[must_use]
    pub fn cache_path(&self, key: &CacheKey) -> PathBuf {
        Self::cache_path_in(key, &self.cache_dir)
    }

    fn search_paths(&self, key: &CacheKey) -> Vec<PathBuf> {
        let mut paths = vec![self.cache_path(key)];
        paths.extend(
            self.read_only_paths
                .read()
                .iter()
                .map(|root| Self::cache_path_in(key, root)),
        );
        paths
    }

    fn write_lock(&self, path: &Path) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        path.file_name().hash(&mut hasher);
        #[allow(clippy::cast_possible_truncation)]
        let idx = (hasher.finish() as usize) % self.write_locks.len();
        &self.write_locks[idx]
    }

    /// Gets raw image bytes from the writable path, then each read-only path.
    /// Any read failure is treated as a miss.
    pub async fn get_bytes(&self, key: &CacheKey) -> Option<Bytes> {
        for path in self.search_paths(key) {
            match fs::read(&path).await {
                Ok(bytes) => {
                    trace!(key = %key, path = %path.display(), "Disk cache hit");
                    return Some(Bytes::from(bytes));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(key = %key, path = %path.display(), error = %e, "Failed to read cache file");
                }
            }
        }
        trace!(key = %key, "Disk cache miss");
        None
    }

    /// Checks if an image is cached in any search path.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        for path in self.search_paths(key) {
            if fs::try_exists(&path).await.unwrap_or(false) {
                return true;
            }
        }
        false
    }

    /// Stores raw bytes in the writable path, replacing any previous file.
    ///
    /// The file is written to a temporary file in the same directory and
    /// persisted over the target, so readers see either the old or the new
    /// content. A failed write removes its temporary file.
    ///
    /// # Errors
    /// Returns error if file cannot be created or written.
    pub async fn put_bytes(&self, key: &CacheKey, bytes: &[u8]) -> CacheResult<()> {
        let path = self.cache_path(key);
        let _guard = self.write_lock(&path).lock().await;

        let dir = self.cache_dir.clone();
        let target = path.clone();
        let data = bytes.to_vec();
        tokio::task::spawn_blocking(move || persist_atomically(&dir, &target, &data))
            .await
            .map_err(|e| CacheError::io(&path, std::io::Error::other(e)))??;

        debug!(key = %key, path = %path.display(), size = bytes.len(), "Stored image in disk cache");
        Ok(())
    }

    /// Removes an image from the writable path. Returns true if a file was
    /// deleted.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be deleted.
    pub async fn remove(&self, key: &CacheKey) -> CacheResult<bool> {
        let path = self.cache_path(key);
        let _guard = self.write_lock(&path).lock().await;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key = %key, "Removed image from disk cache");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    /// Clears every entry in the writable path. Returns the number of
    /// deleted files.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be read.
    pub async fn clear(&self) -> CacheResult<usize> {
        let files = self.list_dir().await?.entries;
        let mut removed = 0;
        for file in files {
            let _guard = self.write_lock(&file.path).lock().await;
            match fs::remove_file(&file.path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %file.path.display(), error = %e, "Failed to remove cache file");
                }
            }
        }
        info!(removed, "Cleared disk cache");
        Ok(removed)
    }

    /// Returns `(file count, total bytes)` of the writable path.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be read.
    pub async fn calculate_size(&self) -> CacheResult<(usize, u64)> {
        let files = self.list_dir().await?.entries;
        let total = files.iter().map(|f| f.size).sum();
        Ok((files.len(), total))
    }

    /// Removes expired entries, then the oldest entries while the writable
    /// path exceeds its size budget.
    ///
    /// When over budget, entries are deleted oldest first until the total is
    /// at most half of the budget, so the next sweeps have headroom. Temporary
    /// files left behind by interrupted writes are deleted once they are an
    /// hour old; they are not part of the report.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be read.
    pub async fn sweep(&self) -> CacheResult<SweepReport> {
        self.sweep_at(SystemTime::now()).await
    }

    async fn sweep_at(&self, now: SystemTime) -> CacheResult<SweepReport> {
        let listing = self.list_dir().await?;
        self.remove_stale_temp_files(listing.temp_files, now).await;
        let report = self.sweep_entries(listing.entries, now).await;

        info!(
            removed = report.removed_count,
            freed_bytes = report.freed_bytes,
            "Disk cache sweep complete"
        );
        Ok(report)
    }

    /// Applies the retention policy to `files` as listed earlier. Files
    /// rewritten since the listing are kept and not reported.
    async fn sweep_entries(&self, files: Vec<DiskFile>, now: SystemTime) -> SweepReport {
        let retention = self.retention();
        let mut report = SweepReport::default();

        let expiry = retention.max_age.and_then(|age| now.checked_sub(age));
        let mut remaining = Vec::with_capacity(files.len());

        for file in files {
            if expiry.is_some_and(|cutoff| file.modified < cutoff) {
                if self.remove_if_unchanged(&file).await {
                    report.removed_count += 1;
                    report.freed_bytes += file.size;
                }
            } else {
                remaining.push(file);
            }
        }

        let mut total: u64 = remaining.iter().map(|f| f.size).sum();
        if retention.max_total_bytes > 0 && total > retention.max_total_bytes {
            let target = retention.max_total_bytes / 2;
            remaining.sort_by_key(|f| f.modified);

            for file in remaining {
                if total <= target {
                    break;
                }
                if self.remove_if_unchanged(&file).await {
                    total -= file.size;
                    report.removed_count += 1;
                    report.freed_bytes += file.size;
                }
            }
        }
        report
    }

    async fn remove_stale_temp_files(&self, temp_files: Vec<DiskFile>, now: SystemTime) {
        let Some(cutoff) = now.checked_sub(STALE_TEMP_FILE_AGE) else {
            return;
        };
        for file in temp_files.into_iter().filter(|f| f.modified < cutoff) {
            match fs::remove_file(&file.path).await {
                Ok(()) => debug!(path = %file.path.display(), "Removed stale temporary file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %file.path.display(), error = %e, "Failed to remove temporary file");
                }
            }
        }
    }

    /// Deletes `file` unless it was rewritten after it was listed.
    async fn remove_if_unchanged(&self, file: &DiskFile) -> bool {
        let _guard = self.write_lock(&file.path).lock().await;

        match fs::metadata(&file.path).await {
            Ok(meta) if meta.modified().ok() == Some(file.modified) => {}
            Ok(_) => {
                trace!(path = %file.path.display(), "Cache file rewritten during sweep, kept");
                return false;
            }
            Err(_) => return false,
        }

        match fs::remove_file(&file.path).await {
            Ok(()) => {
                debug!(path = %file.path.display(), "Removed old cache file");
                true
            }
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %file.path.display(), error = %e, "Failed to remove old cache file");
                }
                false
            }
        }
    }

    async fn list_dir(&self) -> CacheResult<Listing> {
        let mut entries = match fs::read_dir(&self.cache_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Listing::default()),
            Err(e) => return Err(CacheError::io(&self.cache_dir, e)),
        };

        let mut listing = Listing::default();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.cache_dir, e))?
        {
            let path = entry.path();
            let is_temp = entry.file_name().to_string_lossy().ends_with(TEMP_FILE_SUFFIX);
            if !is_temp && path.extension().is_none_or(|ext| ext != DISK_ENTRY_EXTENSION) {
                continue;
            }

            // Vanished between listing and stat.
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let file = DiskFile {
                path,
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                size: meta.len(),
            };
            if is_temp {
                listing.temp_files.push(file);
            } else {
                listing.entries.push(file);
            }
        }
        Ok(listing)
    }
}

/// Writes `bytes` to a temporary file in `dir` and persists it as `path`.
/// The temporary file is deleted if any step fails.
fn persist_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> CacheResult<()> {
    use std::io::Write;

    let mut file = tempfile::Builder::new()
        .prefix(".")
        .suffix(TEMP_FILE_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| CacheError::io(dir, e))?;
    file.write_all(bytes).map_err(|e| CacheError::io(dir, e))?;
    file.persist(path).map_err(|e| CacheError::io(path, e.error))?;
    Ok(())
}

impl std::fmt::Debug for DiskImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskImageCache")
            .field("cache_dir", &self.cache_dir)
            .field("read_only_paths", &*self.read_only_paths.read())
            .field("retention", &*self.retention.read())
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::set_age;
    use super::*;
    use tempfile::TempDir;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    async fn create_test_cache(retention: RetentionPolicy) -> (DiskImageCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskImageCache::new(temp_dir.path().join("ns"), retention, true)
            .await
            .unwrap();
        (cache, temp_dir)
    }

    fn key(k: &str) -> CacheKey {
        CacheKey::new(k)
    }

    #[tokio::test]
    async fn test_put_and_get_bytes() {
        let (cache, _temp) = create_test_cache(RetentionPolicy::default()).await;
        let data = b"test image data";

        cache.put_bytes(&key("test1"), data).await.unwrap();
        let retrieved = cache.get_bytes(&key("test1")).await;

        assert_eq!(retrieved.as_deref(), Some(&data[..]));
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let (cache, _temp) = create_test_cache(RetentionPolicy::default()).await;
        assert!(cache.get_bytes(&key("nonexistent")).await.is_none());
    }

    #[tokio::test]
    async fn test_restore_overwrites_same_path() {
        let (cache, _temp) = create_test_cache(RetentionPolicy::default()).await;

        cache.put_bytes(&key("a"), b"first").await.unwrap();
        cache.put_bytes(&key("a"), b"second").await.unwrap();

        assert_eq!(cache.calculate_size().await.unwrap(), (1, 6));
        assert_eq!(cache.get_bytes(&key("a")).await.as_deref(), Some(&b"second"[..]));
    }

    #[tokio::test]
    async fn test_remove() {
        let (cache, _temp) = create_test_cache(RetentionPolicy::default()).await;

        cache.put_bytes(&key("test1"), b"test").await.unwrap();
        assert!(cache.contains(&key("test1")).await);

        assert!(cache.remove(&key("test1")).await.unwrap());
        assert!(!cache.contains(&key("test1")).await);
        assert!(!cache.remove(&key("test1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear() {
        let (cache, _temp) = create_test_cache(RetentionPolicy::default()).await;

        cache.put_bytes(&key("test1"), b"data1").await.unwrap();
        cache.put_bytes(&key("test2"), b"data2").await.unwrap();
        assert_eq!(cache.calculate_size().await.unwrap().0, 2);

        assert_eq!(cache.clear().await.unwrap(), 2);
        assert_eq!(cache.calculate_size().await.unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn test_cachedir_tag_written_and_not_counted() {
        let (cache, _temp) = create_test_cache(RetentionPolicy::default()).await;
        assert!(cache.cache_dir().join(CACHEDIR_TAG_NAME).exists());
        assert_eq!(cache.calculate_size().await.unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn test_read_only_path_lookup_and_precedence() {
        let (cache, temp) = create_test_cache(RetentionPolicy::default()).await;
        let bundle_a = temp.path().join("bundle_a");
        let bundle_b = temp.path().join("bundle_b");
        std::fs::create_dir_all(&bundle_a).unwrap();
        std::fs::create_dir_all(&bundle_b).unwrap();

        std::fs::write(DiskImageCache::cache_path_in(&key("seeded"), &bundle_a), b"from a").unwrap();
        std::fs::write(DiskImageCache::cache_path_in(&key("seeded"), &bundle_b), b"from b").unwrap();
        cache.add_read_only_path(&bundle_a);
        cache.add_read_only_path(&bundle_b);

        assert_eq!(cache.get_bytes(&key("seeded")).await.as_deref(), Some(&b"from a"[..]));
        assert!(cache.contains(&key("seeded")).await);

        // Writable path wins once populated.
        cache.put_bytes(&key("seeded"), b"fresh").await.unwrap();
        assert_eq!(cache.get_bytes(&key("seeded")).await.as_deref(), Some(&b"fresh"[..]));
    }

    #[tokio::test]
    async fn test_read_only_path_never_mutated() {
        let (cache, temp) = create_test_cache(RetentionPolicy {
            max_age: Some(DAY),
            max_total_bytes: 1,
        })
        .await;
        let bundle = temp.path().join("bundle");
        std::fs::create_dir_all(&bundle).unwrap();
        let seeded = DiskImageCache::cache_path_in(&key("seeded"), &bundle);
        std::fs::write(&seeded, b"bundled").unwrap();
        set_age(&seeded, DAY * 30);
        cache.add_read_only_path(&bundle);

        assert!(!cache.remove(&key("seeded")).await.unwrap());
        cache.sweep().await.unwrap();
        cache.clear().await.unwrap();

        assert!(seeded.exists());
        assert!(cache.get_bytes(&key("seeded")).await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_only() {
        let (cache, _temp) = create_test_cache(RetentionPolicy {
            max_age: Some(DAY),
            max_total_bytes: 0,
        })
        .await;

        cache.put_bytes(&key("old1"), b"12345").await.unwrap();
        cache.put_bytes(&key("old2"), b"123").await.unwrap();
        cache.put_bytes(&key("fresh"), b"1234567").await.unwrap();
        set_age(&cache.cache_path(&key("old1")), DAY * 2);
        set_age(&cache.cache_path(&key("old2")), DAY * 3);

        let report = cache.sweep().await.unwrap();

        assert_eq!(
            report,
            SweepReport {
                removed_count: 2,
                freed_bytes: 8
            }
        );
        assert!(cache.get_bytes(&key("fresh")).await.is_some());
        assert!(cache.get_bytes(&key("old1")).await.is_none());
        assert!(cache.get_bytes(&key("old2")).await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_size_budget_removes_oldest_first() {
        let (cache, _temp) = create_test_cache(RetentionPolicy {
            max_age: None,
            max_total_bytes: 25,
        })
        .await;

        for (name, age_secs) in [("a", 300), ("b", 200), ("c", 100)] {
            cache.put_bytes(&key(name), &[0u8; 10]).await.unwrap();
            set_age(&cache.cache_path(&key(name)), Duration::from_secs(age_secs));
        }

        // 30 bytes over a 25 byte budget: delete oldest until at most 12 remain.
        let report = cache.sweep().await.unwrap();

        assert_eq!(report.removed_count, 2);
        assert_eq!(report.freed_bytes, 20);
        assert!(cache.get_bytes(&key("a")).await.is_none());
        assert!(cache.get_bytes(&key("b")).await.is_none());
        assert!(cache.get_bytes(&key("c")).await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_under_budget_is_noop() {
        let (cache, _temp) = create_test_cache(RetentionPolicy {
            max_age: Some(DAY),
            max_total_bytes: 1024,
        })
        .await;
        cache.put_bytes(&key("a"), b"data").await.unwrap();

        assert_eq!(cache.sweep().await.unwrap(), SweepReport::default());
        assert!(cache.contains(&key("a")).await);
    }

    #[tokio::test]
    async fn test_sweep_removes_stale_temp_files() {
        let (cache, _temp) = create_test_cache(RetentionPolicy {
            max_age: Some(DAY),
            max_total_bytes: 0,
        })
        .await;
        let stale = cache.cache_dir().join(".interrupted.tmp");
        let in_progress = cache.cache_dir().join(".writing.tmp");
        std::fs::write(&stale, b"partial").unwrap();
        std::fs::write(&in_progress, b"partial").unwrap();
        set_age(&stale, DAY * 5);
        assert_eq!(cache.calculate_size().await.unwrap(), (0, 0));

        let report = cache.sweep().await.unwrap();

        assert_eq!(report, SweepReport::default());
        assert!(!stale.exists());
        assert!(in_progress.exists());
    }

    #[tokio::test]
    async fn test_put_bytes_leaves_no_temp_files() {
        let (cache, _temp) = create_test_cache(RetentionPolicy::default()).await;

        cache.put_bytes(&key("a"), b"first").await.unwrap();
        cache.put_bytes(&key("a"), b"second").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(cache.cache_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(TEMP_FILE_SUFFIX)), "{names:?}");
        assert_eq!(names.len(), 2); // entry + CACHEDIR.TAG
    }

    #[tokio::test]
    async fn test_sweep_keeps_file_rewritten_after_listing() {
        let (cache, _temp) = create_test_cache(RetentionPolicy {
            max_age: Some(DAY),
            max_total_bytes: 0,
        })
        .await;
        cache.put_bytes(&key("a"), b"stale").await.unwrap();
        set_age(&cache.cache_path(&key("a")), DAY * 2);

        let listed = cache.list_dir().await.unwrap().entries;
        assert_eq!(listed.len(), 1);
        cache.put_bytes(&key("a"), b"rewritten").await.unwrap();

        let report = cache.sweep_entries(listed, SystemTime::now()).await;

        assert_eq!(report, SweepReport::default());
        assert_eq!(cache.get_bytes(&key("a")).await.as_deref(), Some(&b"rewritten"[..]));
    }

    #[tokio::test]
    async fn test_concurrent_writes_same_key_never_torn() {
        let (cache, _temp) = create_test_cache(RetentionPolicy::default()).await;
        let cache = std::sync::Arc::new(cache);

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.put_bytes(&key("shared"), &[i; 4096]).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let bytes = cache.get_bytes(&key("shared")).await.unwrap();
        assert_eq!(bytes.len(), 4096);
        assert!(bytes.iter().all(|b| *b == bytes[0]));
        assert_eq!(cache.calculate_size().await.unwrap().0, 1);
    }
}
