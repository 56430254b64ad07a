//! Media files: types, metadata persistence and the coordinator that ties
//! the remote store, disk cache and metadata together.

pub mod coordinator;
pub mod repository;
pub mod types;

pub use coordinator::{MediaCoordinator, StoreRegistry};
pub use repository::{FsMetadataRepository, InMemoryMetadataRepository, MetadataRepository};
pub use types::{FileMetadata, MediaFile};
