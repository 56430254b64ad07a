//! Local Disk Cache
//!
//! Keeps the most recently served remote objects as local files so ranged
//! HTTP reads hit the disk instead of the backend. Bounded by entry count
//! with strict LRU eviction.
//!
//! An entry is registered only after its full copy has landed, so eviction
//! never sees a partially written file. Lookup, registration and eviction
//! each run inside one critical section; the lock is never held across an
//! await.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::principal::Principal;
use crate::store::{RemoteStore, StoreError};

/// Default number of cached files
pub const DEFAULT_CAPACITY: usize = 2;

/// Default bound on one full read-through copy
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(600);

/// Bytes requested from the backend per range read during a copy
const COPY_CHUNK_SIZE: usize = 256 * 1024;

/// Longest identifier accepted as a file name
const MAX_ID_LEN: usize = 200;

/// Tracks a cached file for LRU eviction
#[derive(Debug)]
struct CacheEntry {
    /// Path to the cached file on disk
    local_path: PathBuf,
    /// Size of the cached file in bytes
    size: u64,
    /// Access tick, strictly increasing across the cache
    last_access: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    clock: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// Check that an identifier can be used as a single file name
pub fn validate_file_id(file_id: &str) -> Result<(), StoreError> {
    let valid = !file_id.is_empty()
        && file_id.len() <= MAX_ID_LEN
        && !file_id.starts_with('.')
        && file_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(StoreError::InvalidArgument(format!(
            "malformed file id: {:?}",
            file_id
        )));
    }
    Ok(())
}

/// Bounded read-through cache of remote objects on local disk
pub struct DiskCache {
    /// Directory owned by this cache
    cache_dir: PathBuf,
    /// Maximum number of cached files
    capacity: usize,
    /// Deadline for one read-through copy
    fetch_timeout: Duration,
    state: Mutex<CacheState>,
}

impl DiskCache {
    /// Create a cache with default capacity and fetch timeout
    pub fn new(cache_dir: PathBuf) -> Result<Self, StoreError> {
        Self::with_config(cache_dir, DEFAULT_CAPACITY, DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a cache with custom configuration
    ///
    /// Anything already in `cache_dir` is deleted: cached entries do not
    /// survive a restart.
    ///
    /// # Arguments
    /// * `cache_dir` - Directory to store cached files
    /// * `capacity` - Maximum number of cached files (at least 1)
    /// * `fetch_timeout` - Bound on copying one object from the backend
    pub fn with_config(
        cache_dir: PathBuf,
        capacity: usize,
        fetch_timeout: Duration,
    ) -> Result<Self, StoreError> {
        if capacity == 0 {
            return Err(StoreError::InvalidArgument(
                "cache capacity must be at least 1".to_string(),
            ));
        }

        match fs::remove_dir_all(&cache_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&cache_dir)?;

        info!(
            cache_dir = %cache_dir.display(),
            capacity = capacity,
            fetch_timeout_secs = fetch_timeout.as_secs(),
            "Disk cache initialized"
        );

        Ok(Self {
            cache_dir,
            capacity,
            fetch_timeout,
            state: Mutex::new(CacheState::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a local copy of `file_id`, pulling it from `store` on a miss.
    ///
    /// Every call returns its own handle positioned at the start of the file.
    pub async fn get_file_content(
        &self,
        principal: &Principal,
        store: &dyn RemoteStore,
        file_id: &str,
    ) -> Result<tokio::fs::File, StoreError> {
        let local_path = self.path_to_local(file_id)?;

        if let Some(file) = self.open_cached(file_id)? {
            debug!(file_id = file_id, "Disk cache HIT");
            return Ok(tokio::fs::File::from_std(file));
        }

        debug!(file_id = file_id, store = store.name(), "Disk cache MISS, fetching");

        // Dropping the fetch future on timeout drops (and deletes) its staging file
        let (staging, size) =
            match tokio::time::timeout(self.fetch_timeout, self.fetch(principal, store, file_id)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(StoreError::BackendUnavailable(format!(
                        "fetching '{}' from {} exceeded {:?}",
                        file_id,
                        store.name(),
                        self.fetch_timeout
                    )))
                }
            };

        let file = self.register(file_id, local_path, staging, size)?;
        Ok(tokio::fs::File::from_std(file))
    }

    /// Look up an entry, bump its access tick and open it under the lock
    fn open_cached(&self, file_id: &str) -> Result<Option<fs::File>, StoreError> {
        let mut state = self.lock();
        let tick = state.tick();
        let Some(entry) = state.entries.get_mut(file_id) else {
            return Ok(None);
        };
        entry.last_access = tick;

        match fs::File::open(&entry.local_path) {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(file_id = file_id, "Cached file disappeared from disk, refetching");
                state.entries.remove(file_id);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Copy the whole remote object into a staging file in the cache directory
    async fn fetch(
        &self,
        principal: &Principal,
        store: &dyn RemoteStore,
        file_id: &str,
    ) -> Result<(NamedTempFile, u64), StoreError> {
        let mut reader = store.get(principal, file_id).await?;

        let mut staging = tempfile::Builder::new()
            .prefix(".fetch-")
            .suffix(".tmp")
            .tempfile_in(&self.cache_dir)?;

        let mut buf = vec![0u8; COPY_CHUNK_SIZE];
        let mut copied: u64 = 0;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            staging.write_all(&buf[..n])?;
            copied += n as u64;
        }
        staging.flush()?;

        if copied != reader.size() {
            return Err(StoreError::BackendUnavailable(format!(
                "incomplete copy of '{}': {} of {} bytes",
                file_id,
                copied,
                reader.size()
            )));
        }

        debug!(file_id = file_id, size = copied, "Fetched remote object");
        Ok((staging, copied))
    }

    /// Move a completed copy into place, insert it and evict down to capacity
    fn register(
        &self,
        file_id: &str,
        local_path: PathBuf,
        staging: NamedTempFile,
        size: u64,
    ) -> Result<fs::File, StoreError> {
        let mut state = self.lock();

        staging
            .persist(&local_path)
            .map_err(|e| StoreError::Io(e.error))?;
        let file = fs::File::open(&local_path)?;

        let tick = state.tick();
        state.entries.insert(
            file_id.to_string(),
            CacheEntry {
                local_path,
                size,
                last_access: tick,
            },
        );
        self.evict_locked(&mut state);

        debug!(file_id = file_id, size = size, entries = state.entries.len(), "Stored file in cache");
        Ok(file)
    }

    /// Evict least recently used entries until the cache fits its capacity
    fn evict_locked(&self, state: &mut CacheState) {
        while state.entries.len() > self.capacity {
            let Some(victim) = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(id, _)| id.clone())
            else {
                break;
            };

            if let Some(entry) = state.entries.get(&victim) {
                match fs::remove_file(&entry.local_path) {
                    Ok(()) => debug!(file_id = %victim, size = entry.size, "Evicted cached file"),
                    Err(e) => warn!(
                        file_id = %victim,
                        path = %entry.local_path.display(),
                        error = %e,
                        "Failed to delete evicted file"
                    ),
                }
            }
            state.entries.remove(&victim);
        }
    }

    /// Remove every entry and its file
    pub fn clear(&self) {
        let mut state = self.lock();
        for (file_id, entry) in state.entries.drain() {
            if let Err(e) = fs::remove_file(&entry.local_path) {
                warn!(file_id = %file_id, error = %e, "Failed to delete cached file");
            }
        }
        info!(cache_dir = %self.cache_dir.display(), "Disk cache cleared");
    }

    pub fn contains(&self, file_id: &str) -> bool {
        self.lock().entries.contains_key(file_id)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the cache directory path
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Convert an object identifier to its local cache path
    fn path_to_local(&self, file_id: &str) -> Result<PathBuf, StoreError> {
        validate_file_id(file_id)?;
        Ok(self.cache_dir.join(file_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaFile;
    use crate::store::{InMemoryStore, RangeSource, SeekableRemoteReader};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;

    fn alice() -> Principal {
        Principal::new("alice", "token")
    }

    fn temp_cache(capacity: usize) -> (tempfile::TempDir, DiskCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            DiskCache::with_config(dir.path().join("cache"), capacity, Duration::from_secs(5)).unwrap();
        (dir, cache)
    }

    fn content_for(id: &str) -> Vec<u8> {
        format!("audio bytes of {}", id).into_bytes()
    }

    fn store_with(ids: &[&str]) -> InMemoryStore {
        let store = InMemoryStore::new();
        for id in ids {
            store.insert(*id, content_for(id));
        }
        store
    }

    async fn read_all(mut file: tokio::fs::File) -> Vec<u8> {
        let mut out = Vec::new();
        file.read_to_end(&mut out).await.unwrap();
        out
    }

    fn dir_entries(path: &Path) -> usize {
        fs::read_dir(path).unwrap().count()
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let (_dir, cache) = temp_cache(2);
        let store = store_with(&["A"]);

        let first = cache.get_file_content(&alice(), &store, "A").await.unwrap();
        assert_eq!(read_all(first).await, content_for("A"));
        assert_eq!(store.open_count(), 1);

        let second = cache.get_file_content(&alice(), &store, "A").await.unwrap();
        assert_eq!(read_all(second).await, content_for("A"));
        assert_eq!(store.open_count(), 1, "hit must not touch the backend");
        assert!(cache.cache_dir().join("A").exists());
    }

    #[tokio::test]
    async fn test_capacity_bound_for_several_sizes() {
        for capacity in 1..=4usize {
            let (_dir, cache) = temp_cache(capacity);
            let ids: Vec<String> = (0..=capacity).map(|i| format!("id{}", i)).collect();
            let store = InMemoryStore::new();
            for id in &ids {
                store.insert(id.clone(), content_for(id));
            }

            for id in &ids {
                cache.get_file_content(&alice(), &store, id).await.unwrap();
            }

            assert_eq!(cache.len(), capacity);
            assert!(!cache.contains(&ids[0]));
            assert!(!cache.cache_dir().join(&ids[0]).exists());
            for id in &ids[1..] {
                assert!(cache.contains(id));
                assert!(cache.cache_dir().join(id).exists());
            }
            assert_eq!(dir_entries(cache.cache_dir()), capacity);
        }
    }

    #[tokio::test]
    async fn test_lru_scenario_a_b_c_then_a() {
        let (_dir, cache) = temp_cache(2);
        let store = store_with(&["A", "B", "C"]);

        for id in ["A", "B", "C"] {
            cache.get_file_content(&alice(), &store, id).await.unwrap();
        }
        assert!(!cache.contains("A"));
        assert!(cache.contains("B"));
        assert!(cache.contains("C"));

        let again = cache.get_file_content(&alice(), &store, "A").await.unwrap();
        assert_eq!(read_all(again).await, content_for("A"));
        assert_eq!(store.open_count(), 4, "re-fetching A is a miss");
        assert!(!cache.contains("B"));
        assert!(!cache.cache_dir().join("B").exists());
        assert!(cache.contains("A"));
        assert!(cache.contains("C"));
    }

    #[tokio::test]
    async fn test_hit_refreshes_recency() {
        let (_dir, cache) = temp_cache(2);
        let store = store_with(&["A", "B", "C"]);

        cache.get_file_content(&alice(), &store, "A").await.unwrap();
        cache.get_file_content(&alice(), &store, "B").await.unwrap();
        cache.get_file_content(&alice(), &store, "A").await.unwrap();
        cache.get_file_content(&alice(), &store, "C").await.unwrap();

        assert!(cache.contains("A"));
        assert!(!cache.contains("B"));
        assert!(cache.contains("C"));
    }

    #[tokio::test]
    async fn test_handles_are_independent() {
        let (_dir, cache) = temp_cache(2);
        let store = store_with(&["A"]);
        cache.get_file_content(&alice(), &store, "A").await.unwrap();

        let mut h1 = cache.get_file_content(&alice(), &store, "A").await.unwrap();
        let h2 = cache.get_file_content(&alice(), &store, "A").await.unwrap();

        let mut head = [0u8; 5];
        h1.read_exact(&mut head).await.unwrap();
        assert_eq!(&head, b"audio");

        assert_eq!(read_all(h2).await, content_for("A"));
        // h1 resumes where it stopped, unaffected by h2 reaching the end
        assert_eq!(read_all(h1).await, content_for("A")[5..].to_vec());
    }

    #[tokio::test]
    async fn test_open_handle_survives_eviction() {
        let (_dir, cache) = temp_cache(1);
        let store = store_with(&["A", "B"]);

        let handle = cache.get_file_content(&alice(), &store, "A").await.unwrap();
        cache.get_file_content(&alice(), &store, "B").await.unwrap();
        assert!(!cache.cache_dir().join("A").exists());

        // The unlinked file stays readable through the open handle
        assert_eq!(read_all(handle).await, content_for("A"));
    }

    #[tokio::test]
    async fn test_missing_object_leaves_nothing_behind() {
        let (_dir, cache) = temp_cache(2);
        let store = InMemoryStore::new();

        let err = cache.get_file_content(&alice(), &store, "nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(cache.is_empty());
        assert_eq!(dir_entries(cache.cache_dir()), 0);
    }

    /// Serves the first chunk and then fails every later range
    struct BreaksMidway {
        data: Bytes,
    }

    #[async_trait]
    impl RangeSource for BreaksMidway {
        async fn fetch_range(
            &self,
            _principal: &Principal,
            _file_id: &str,
            start: u64,
            end: u64,
        ) -> Result<Bytes, StoreError> {
            if start > 0 {
                return Err(StoreError::BackendUnavailable("connection reset".into()));
            }
            Ok(self.data.slice(start as usize..=end as usize))
        }
    }

    struct FlakyStore {
        source: Arc<BreaksMidway>,
        delay: Duration,
    }

    #[async_trait]
    impl RemoteStore for FlakyStore {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn generate_id(&self, _principal: &Principal) -> Result<String, StoreError> {
            Ok("x".to_string())
        }

        async fn save(&self, _principal: &Principal, _file: &MediaFile) -> Result<(), StoreError> {
            Ok(())
        }

        async fn get(
            &self,
            principal: &Principal,
            file_id: &str,
        ) -> Result<SeekableRemoteReader, StoreError> {
            tokio::time::sleep(self.delay).await;
            let source: Arc<dyn RangeSource> = self.source.clone();
            let size = self.source.data.len() as u64;
            Ok(SeekableRemoteReader::new(source, principal.clone(), file_id, size))
        }
    }

    fn flaky(delay: Duration) -> FlakyStore {
        FlakyStore {
            source: Arc::new(BreaksMidway {
                data: Bytes::from(vec![7u8; COPY_CHUNK_SIZE * 2 + 10]),
            }),
            delay,
        }
    }

    #[tokio::test]
    async fn test_failed_copy_removes_partial_file() {
        let (_dir, cache) = temp_cache(2);
        let store = flaky(Duration::ZERO);

        let err = cache.get_file_content(&alice(), &store, "big").await.unwrap_err();
        assert!(matches!(err, StoreError::BackendUnavailable(_)));
        assert!(!cache.contains("big"));
        assert_eq!(dir_entries(cache.cache_dir()), 0);
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            DiskCache::with_config(dir.path().join("c"), 2, Duration::from_millis(50)).unwrap();
        let store = flaky(Duration::from_secs(10));

        let err = cache.get_file_content(&alice(), &store, "slow").await.unwrap_err();
        assert!(matches!(err, StoreError::BackendUnavailable(_)));
        assert!(cache.is_empty());
        assert_eq!(dir_entries(cache.cache_dir()), 0);
    }

    #[test]
    fn test_init_clears_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        fs::create_dir_all(&cache_dir).unwrap();
        fs::write(cache_dir.join("leftover"), b"stale").unwrap();

        let cache = DiskCache::new(cache_dir.clone()).unwrap();
        assert_eq!(cache.capacity(), DEFAULT_CAPACITY);
        assert!(!cache_dir.join("leftover").exists());
        assert!(cache_dir.is_dir());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DiskCache::with_config(dir.path().join("c"), 0, DEFAULT_FETCH_TIMEOUT),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_ids_rejected() {
        let (_dir, cache) = temp_cache(2);
        let store = InMemoryStore::new();
        for bad in ["", "../etc/passwd", "a/b", ".hidden", "sp ace"] {
            assert!(matches!(
                cache.get_file_content(&alice(), &store, bad).await,
                Err(StoreError::InvalidArgument(_))
            ));
        }
        assert_eq!(store.open_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_removes_files() {
        let (_dir, cache) = temp_cache(2);
        let store = store_with(&["A", "B"]);
        cache.get_file_content(&alice(), &store, "A").await.unwrap();
        cache.get_file_content(&alice(), &store, "B").await.unwrap();

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(dir_entries(cache.cache_dir()), 0);
    }
}
