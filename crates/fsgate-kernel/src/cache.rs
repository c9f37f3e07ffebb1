//! File content cache.
//!
//! Whole-file contents keyed by resolved path, bounded by a byte budget with
//! LRU eviction and by a TTL. A hit also requires the file's current mtime to
//! equal the mtime recorded at insertion, so external modifications are never
//! served stale. A second, larger, count-bounded cache keeps only metadata
//! for cheap size/mtime lookups.
//!
//! Cache failures never surface as errors: anything unexpected degrades to a
//! miss or to "not cached".

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::config::CacheConfig;

/// A cached file body.
struct CachedFile {
    content: Arc<[u8]>,
    mtime: SystemTime,
    size_bytes: u64,
    inserted_at: Instant,
}

/// Metadata-only cache record.
#[derive(Debug, Clone)]
pub struct CacheMetadata {
    pub path: PathBuf,
    pub mtime: SystemTime,
    pub size_bytes: u64,
    inserted_at: Instant,
}

/// Counters exposed read-only to callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub current_size_bytes: u64,
    pub entry_count: usize,
}

/// Recency order and aggregate size, kept together so they cannot drift.
///
/// Front of the map is least recently used.
#[derive(Default)]
struct ContentLedger {
    entries: IndexMap<PathBuf, CachedFile>,
    total_bytes: u64,
}

impl ContentLedger {
    fn peek(&self, path: &Path) -> Option<(SystemTime, Instant)> {
        self.entries.get(path).map(|e| (e.mtime, e.inserted_at))
    }

    /// Mark `path` most recently used and return its content.
    fn touch(&mut self, path: &Path) -> Option<Arc<[u8]>> {
        let (key, entry) = self.entries.shift_remove_entry(path)?;
        let content = entry.content.clone();
        self.entries.insert(key, entry);
        Some(content)
    }

    fn insert(&mut self, path: PathBuf, entry: CachedFile) {
        self.remove(&path);
        self.total_bytes += entry.size_bytes;
        self.entries.insert(path, entry);
    }

    fn remove(&mut self, path: &Path) -> bool {
        match self.entries.shift_remove(path) {
            Some(entry) => {
                self.total_bytes -= entry.size_bytes;
                true
            }
            None => false,
        }
    }

    /// Evict least recently used entries until `incoming` more bytes fit.
    fn evict_to_fit(&mut self, budget: u64, incoming: u64) -> u64 {
        let mut evicted = 0;
        while self.total_bytes + incoming > budget {
            let Some((path, entry)) = self.entries.shift_remove_index(0) else {
                break;
            };
            self.total_bytes -= entry.size_bytes;
            evicted += 1;
            tracing::trace!(path = %path.display(), bytes = entry.size_bytes, "cache evict");
        }
        evicted
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }
}

/// LRU + TTL file content cache.
///
/// Constructed once at bootstrap and shared by reference; all interior
/// locking is short and never held across an `.await`.
pub struct FileCache {
    config: RwLock<CacheConfig>,
    content: Mutex<ContentLedger>,
    metadata: Mutex<IndexMap<PathBuf, CacheMetadata>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl FileCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config: RwLock::new(config),
            content: Mutex::new(ContentLedger::default()),
            metadata: Mutex::new(IndexMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Current configuration.
    pub fn config(&self) -> CacheConfig {
        self.config.read().clone()
    }

    /// Cached content for `path`, if present, fresh, and unchanged on disk.
    pub async fn get(&self, path: &Path) -> Option<Arc<[u8]>> {
        let config = self.config();
        if !config.enabled {
            return None;
        }

        let snapshot = self.content.lock().peek(path);
        let Some((mtime, inserted_at)) = snapshot else {
            return self.miss(path, "absent");
        };

        if inserted_at.elapsed() > config.ttl() {
            self.invalidate(path);
            return self.miss(path, "expired");
        }

        let current = tokio::fs::metadata(path)
            .await
            .and_then(|m| m.modified())
            .ok();
        if current != Some(mtime) {
            self.invalidate(path);
            return self.miss(path, "modified");
        }

        match self.content.lock().touch(path) {
            Some(content) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(path = %path.display(), "cache hit");
                Some(content)
            }
            None => self.miss(path, "raced"),
        }
    }

    /// Cache `content` as the current body of `path`.
    ///
    /// Stats the file for its mtime and on-disk size. Skips caching when the
    /// stat fails, when the size disagrees with `content` (the file changed
    /// mid-read), or when the entry alone exceeds the byte budget.
    pub async fn set(&self, path: &Path, content: impl Into<Arc<[u8]>>) {
        let config = self.config();
        if !config.enabled {
            return;
        }
        let content = content.into();

        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::trace!(path = %path.display(), error = %e, "cache set skipped: stat failed");
                return;
            }
        };
        let Ok(mtime) = meta.modified() else {
            return;
        };
        let size_bytes = meta.len();

        if size_bytes != content.len() as u64 {
            tracing::debug!(path = %path.display(), "cache set skipped: file changed while reading");
            self.invalidate(path);
            return;
        }

        self.record(path, mtime, size_bytes, config.metadata_capacity);

        if size_bytes > config.max_size_bytes {
            self.content.lock().remove(path);
            tracing::debug!(
                path = %path.display(),
                size_bytes,
                budget = config.max_size_bytes,
                "cache set skipped: larger than budget"
            );
            return;
        }

        let evicted = {
            let mut ledger = self.content.lock();
            ledger.remove(path);
            let evicted = ledger.evict_to_fit(config.max_size_bytes, size_bytes);
            ledger.insert(
                path.to_path_buf(),
                CachedFile {
                    content,
                    mtime,
                    size_bytes,
                    inserted_at: Instant::now(),
                },
            );
            evicted
        };
        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
        }
    }

    /// Cached metadata for `path`, without touching the filesystem.
    pub fn metadata(&self, path: &Path) -> Option<CacheMetadata> {
        let config = self.config();
        if !config.enabled {
            return None;
        }
        let mut records = self.metadata.lock();
        let (key, record) = records.shift_remove_entry(path)?;
        if record.inserted_at.elapsed() > config.ttl() {
            return None;
        }
        records.insert(key, record.clone());
        Some(record)
    }

    /// Remember size and mtime for `path` from an existing stat.
    pub fn record_metadata(&self, path: &Path, meta: &std::fs::Metadata) {
        let config = self.config();
        if !config.enabled {
            return;
        }
        if let Ok(mtime) = meta.modified() {
            self.record(path, mtime, meta.len(), config.metadata_capacity);
        }
    }

    fn record(&self, path: &Path, mtime: SystemTime, size_bytes: u64, capacity: usize) {
        let mut records = self.metadata.lock();
        records.shift_remove(path);
        records.insert(
            path.to_path_buf(),
            CacheMetadata {
                path: path.to_path_buf(),
                mtime,
                size_bytes,
                inserted_at: Instant::now(),
            },
        );
        while records.len() > capacity {
            records.shift_remove_index(0);
        }
    }

    /// Drop everything cached for `path`.
    pub fn invalidate(&self, path: &Path) {
        let removed = self.content.lock().remove(path);
        self.metadata.lock().shift_remove(path);
        if removed {
            tracing::trace!(path = %path.display(), "cache invalidate");
        }
    }

    /// Drop every entry.
    pub fn invalidate_all(&self) {
        self.content.lock().clear();
        self.metadata.lock().clear();
        tracing::debug!("cache cleared");
    }

    /// Apply a new configuration.
    ///
    /// Disabling clears the cache; a smaller budget evicts down to it.
    pub fn reconfigure(&self, config: CacheConfig) {
        let enabled = config.enabled;
        let budget = config.max_size_bytes;
        let capacity = config.metadata_capacity;
        *self.config.write() = config;

        if !enabled {
            self.invalidate_all();
            return;
        }

        let evicted = self.content.lock().evict_to_fit(budget, 0);
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
        let mut records = self.metadata.lock();
        while records.len() > capacity {
            records.shift_remove_index(0);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let (current_size_bytes, entry_count) = {
            let ledger = self.content.lock();
            (ledger.total_bytes, ledger.entries.len())
        };
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            current_size_bytes,
            entry_count,
        }
    }

    fn miss(&self, path: &Path, reason: &'static str) -> Option<Arc<[u8]>> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(path = %path.display(), reason, "cache miss");
        None
    }
}

impl std::fmt::Debug for FileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCache")
            .field("config", &*self.config.read())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(max_size_bytes: u64) -> CacheConfig {
        CacheConfig {
            max_size_bytes,
            ..CacheConfig::default()
        }
    }

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn backdate(path: &Path) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();
    }

    #[tokio::test]
    async fn test_set_then_get_hits() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.txt", "hello");
        let cache = FileCache::new(CacheConfig::default());

        assert!(cache.get(&path).await.is_none());
        cache.set(&path, b"hello".to_vec()).await;
        assert_eq!(cache.get(&path).await.as_deref(), Some(&b"hello"[..]));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.current_size_bytes, 5);
    }

    #[tokio::test]
    async fn test_mtime_change_misses() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.txt", "hello");
        let cache = FileCache::new(CacheConfig::default());
        cache.set(&path, b"hello".to_vec()).await;

        backdate(&path);

        assert!(cache.get(&path).await.is_none());
        assert_eq!(cache.stats().entry_count, 0);
    }

    #[tokio::test]
    async fn test_deleted_file_misses() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.txt", "hello");
        let cache = FileCache::new(CacheConfig::default());
        cache.set(&path, b"hello".to_vec()).await;

        std::fs::remove_file(&path).unwrap();

        assert!(cache.get(&path).await.is_none());
        assert_eq!(cache.stats().current_size_bytes, 0);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.txt", "hello");
        let cache = FileCache::new(CacheConfig {
            ttl_ms: 1,
            ..CacheConfig::default()
        });
        cache.set(&path, b"hello".to_vec()).await;

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(cache.get(&path).await.is_none());
        assert!(cache.metadata(&path).is_none());
    }

    #[tokio::test]
    async fn test_budget_evicts_least_recently_used() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a", "aaaa");
        let b = write(&dir, "b", "bbbb");
        let c = write(&dir, "c", "cccc");
        let d = write(&dir, "d", "dddd");
        let cache = FileCache::new(config(12));

        cache.set(&a, b"aaaa".to_vec()).await;
        cache.set(&b, b"bbbb".to_vec()).await;
        cache.set(&c, b"cccc".to_vec()).await;
        assert!(cache.get(&a).await.is_some());

        cache.set(&d, b"dddd".to_vec()).await;

        assert!(cache.get(&b).await.is_none());
        assert!(cache.get(&a).await.is_some());
        assert!(cache.get(&c).await.is_some());
        assert!(cache.get(&d).await.is_some());
        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert!(stats.current_size_bytes <= 12);
    }

    #[tokio::test]
    async fn test_oversized_entry_not_cached() {
        let dir = TempDir::new().unwrap();
        let small = write(&dir, "small", "abc");
        let big = write(&dir, "big", "0123456789");
        let cache = FileCache::new(config(5));

        cache.set(&small, b"abc".to_vec()).await;
        cache.set(&big, b"0123456789".to_vec()).await;

        assert!(cache.get(&big).await.is_none());
        assert!(cache.get(&small).await.is_some());
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.stats().current_size_bytes, 3);
    }

    #[tokio::test]
    async fn test_size_mismatch_not_cached() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a", "on disk");
        let cache = FileCache::new(CacheConfig::default());

        cache.set(&path, b"stale".to_vec()).await;
        assert_eq!(cache.stats().entry_count, 0);
    }

    #[tokio::test]
    async fn test_missing_file_set_is_silent() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(CacheConfig::default());
        cache.set(&dir.path().join("ghost"), b"boo".to_vec()).await;
        assert_eq!(cache.stats().entry_count, 0);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a", "x");
        let cache = FileCache::new(CacheConfig::default());
        cache.set(&path, b"x".to_vec()).await;

        cache.invalidate(&path);

        assert!(cache.get(&path).await.is_none());
        assert!(cache.metadata(&path).is_none());
    }

    #[tokio::test]
    async fn test_disabled_cache_is_inert() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a", "x");
        let cache = FileCache::new(CacheConfig::disabled());

        cache.set(&path, b"x".to_vec()).await;
        assert!(cache.get(&path).await.is_none());
        assert_eq!(cache.stats().entry_count, 0);
    }

    #[tokio::test]
    async fn test_reconfigure() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a", "aaaa");
        let b = write(&dir, "b", "bbbb");
        let cache = FileCache::new(config(100));
        cache.set(&a, b"aaaa".to_vec()).await;
        cache.set(&b, b"bbbb".to_vec()).await;

        cache.reconfigure(config(4));
        assert_eq!(cache.stats().entry_count, 1);
        assert!(cache.get(&b).await.is_some());

        cache.reconfigure(CacheConfig::disabled());
        assert_eq!(cache.stats().entry_count, 0);
        assert!(!cache.config().enabled);
    }

    #[tokio::test]
    async fn test_metadata_records() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a", "12345");
        let b = write(&dir, "b", "1");
        let cache = FileCache::new(CacheConfig {
            metadata_capacity: 1,
            ..CacheConfig::default()
        });

        cache.set(&a, b"12345".to_vec()).await;
        assert_eq!(cache.metadata(&a).map(|m| m.size_bytes), Some(5));

        let meta = std::fs::metadata(&b).unwrap();
        cache.record_metadata(&b, &meta);
        assert!(cache.metadata(&a).is_none());
        assert_eq!(cache.metadata(&b).map(|m| m.size_bytes), Some(1));
    }
}
