//! Metadata Cache Implementation
//!
//! TTL cache for file metadata records using Moka, sitting in front of the
//! metadata repository so repeated range requests for one episode do not
//! reload its document.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache;
use tracing::{debug, trace};

use crate::media::FileMetadata;

/// Default time a record stays cached
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default maximum number of cached records
pub const DEFAULT_MAX_ENTRIES: u64 = 1000;

/// Metadata cache with TTL support and hit/miss accounting
pub struct MetadataCache {
    /// Records by file id
    records: Cache<String, FileMetadata>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache with custom TTL and size bound
    ///
    /// # Arguments
    /// * `ttl` - How long a record may be served without reloading
    /// * `max_entries` - Upper bound on cached records
    pub fn with_config(ttl: Duration, max_entries: u64) -> Self {
        let records = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(max_entries)
            .name("file_metadata_cache")
            .build();

        Self {
            records,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get a record, updating hit/miss counters
    pub fn get(&self, file_id: &str) -> Option<FileMetadata> {
        match self.records.get(file_id) {
            Some(metadata) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(file_id = file_id, "Cache HIT for metadata");
                Some(metadata)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(file_id = file_id, "Cache MISS for metadata");
                None
            }
        }
    }

    pub fn insert(&self, metadata: FileMetadata) {
        debug!(file_id = %metadata.id, "Cached file metadata");
        self.records.insert(metadata.id.clone(), metadata);
    }

    /// Drop one record so the next lookup reloads it
    pub fn invalidate(&self, file_id: &str) {
        self.records.invalidate(file_id);
        debug!(file_id = file_id, "Invalidated metadata cache entry");
    }

    /// Clear all records and reset the counters
    pub fn clear(&self) {
        self.records.invalidate_all();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        debug!("Cleared metadata cache");
    }

    /// Get cache statistics
    ///
    /// Returns (hits, misses, hit_rate)
    pub fn stats(&self) -> (u64, u64, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        (hits, misses, hit_rate)
    }

    pub fn log_metrics(&self) {
        let (hits, misses, hit_rate) = self.stats();
        debug!(
            hits = hits,
            misses = misses,
            hit_rate = format!("{:.1}%", hit_rate),
            entries = self.records.entry_count(),
            "Metadata cache metrics"
        );
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> FileMetadata {
        let mut metadata = FileMetadata::new(format!("episode {}", id), "audio/mpeg");
        metadata.id = id.to_string();
        metadata
    }

    #[test]
    fn test_cache_hit_miss() {
        let cache = MetadataCache::new();

        assert!(cache.get("a").is_none());
        let (_, _, hit_rate) = cache.stats();
        assert_eq!(hit_rate, 0.0);

        cache.insert(record("a"));
        assert_eq!(cache.get("a").unwrap().name, "episode a");

        let (hits, misses, hit_rate) = cache.stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
        assert!(hit_rate > 49.0 && hit_rate < 51.0);
    }

    #[test]
    fn test_cache_invalidation() {
        let cache = MetadataCache::new();
        cache.insert(record("a"));
        assert!(cache.get("a").is_some());

        cache.invalidate("a");
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_cache_clear() {
        let cache = MetadataCache::new();
        cache.insert(record("a"));
        cache.insert(record("b"));

        cache.clear();

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
        let (hits, misses, _) = cache.stats();
        assert_eq!(hits, 0);
        assert_eq!(misses, 2);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = MetadataCache::with_config(Duration::from_millis(20), 10);
        cache.insert(record("a"));
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get("a").is_none());
    }
}
