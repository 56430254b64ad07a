//! Caching layer
//!
//! A bounded LRU disk cache of served content plus a TTL cache for metadata
//! records.

pub mod disk;
pub mod metadata;

pub use disk::DiskCache;
pub use metadata::MetadataCache;
