//! Media coordinator
//!
//! Single entry point for saving audio files and serving them back. Uploads
//! go to the principal's default store and the metadata repository; reads
//! go through the disk cache, pulling from whichever store the file's
//! metadata names.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::repository::MetadataRepository;
use super::types::{FileMetadata, MediaFile};
use crate::cache::disk::validate_file_id;
use crate::cache::{DiskCache, MetadataCache};
use crate::principal::Principal;
use crate::store::{MediaError, RemoteStore, StoreError, StoreType};

/// Backends available to the coordinator, keyed by type
pub type StoreRegistry = HashMap<StoreType, Arc<dyn RemoteStore>>;

pub struct MediaCoordinator {
    stores: StoreRegistry,
    cache: Arc<DiskCache>,
    metadata: Arc<dyn MetadataRepository>,
    metadata_cache: MetadataCache,
}

impl MediaCoordinator {
    pub fn new(
        stores: StoreRegistry,
        cache: Arc<DiskCache>,
        metadata: Arc<dyn MetadataRepository>,
        metadata_cache: MetadataCache,
    ) -> Self {
        Self {
            stores,
            cache,
            metadata,
            metadata_cache,
        }
    }

    fn store(&self, store_type: StoreType) -> Result<&Arc<dyn RemoteStore>, StoreError> {
        self.stores
            .get(&store_type)
            .ok_or_else(|| StoreError::UnregisteredStore(store_type.to_string()))
    }

    /// Upload a file and record its metadata, returning the identifier.
    ///
    /// The file goes to the store named in its metadata, or the principal's
    /// default store when unset. An id is generated when the metadata carries
    /// none. If the metadata write fails after a successful upload the
    /// uploaded object is left in place and the error is returned.
    pub async fn save_file(
        &self,
        principal: &Principal,
        mut file: MediaFile,
    ) -> Result<String, MediaError> {
        let user = principal.username.as_str();

        let store_type = *file
            .metadata
            .store_type
            .get_or_insert(principal.default_store);
        let store = self
            .store(store_type)
            .map_err(|e| e.context("save_file", user, &file.metadata.id))?;

        if file.metadata.id.is_empty() {
            file.metadata.id = store
                .generate_id(principal)
                .await
                .map_err(|e| e.context("generate_id", user, ""))?;
        }
        let file_id = file.metadata.id.clone();
        validate_file_id(&file_id).map_err(|e| e.context("save_file", user, &file_id))?;

        if file.metadata.size == 0 {
            file.metadata.size = file.content.len() as u64;
        }

        store
            .save(principal, &file)
            .await
            .map_err(|e| e.context("save_file", user, &file_id))?;

        if let Err(e) = self.metadata.save_file_metadata(principal, &file.metadata).await {
            warn!(
                user = user,
                file_id = %file_id,
                store = %store_type,
                error = %e,
                "Metadata write failed after upload, remote object is orphaned"
            );
            return Err(e.context("save_file_metadata", user, &file_id));
        }

        info!(
            user = user,
            file_id = %file_id,
            size = file.metadata.size,
            store = %store_type,
            "Saved media file"
        );
        self.metadata_cache.insert(file.metadata);
        Ok(file_id)
    }

    /// Open the file's content from the disk cache, fetching it on a miss
    /// from the store recorded in its metadata
    pub async fn get_file_content(
        &self,
        principal: &Principal,
        file_id: &str,
    ) -> Result<tokio::fs::File, MediaError> {
        let metadata = self.get_file_metadata(principal, file_id).await?;
        let context = |e: StoreError| e.context("get_file_content", &principal.username, file_id);

        let store_type = metadata
            .store_type
            .ok_or_else(|| context(StoreError::UnregisteredStore("unset".to_string())))?;
        let store = self.store(store_type).map_err(context)?;

        self.cache
            .get_file_content(principal, store.as_ref(), file_id)
            .await
            .map_err(context)
    }

    pub async fn get_file_metadata(
        &self,
        principal: &Principal,
        file_id: &str,
    ) -> Result<FileMetadata, MediaError> {
        if let Some(metadata) = self.metadata_cache.get(file_id) {
            return Ok(metadata);
        }

        let context = |e: StoreError| e.context("get_file_metadata", &principal.username, file_id);
        let metadata = self
            .metadata
            .get_file_metadata(file_id)
            .await
            .map_err(context)?
            .ok_or_else(|| context(StoreError::MetadataNotFound(file_id.to_string())))?;

        debug!(file_id = file_id, name = %metadata.name, "Loaded metadata record");
        self.metadata_cache.insert(metadata.clone());
        Ok(metadata)
    }

    pub fn disk_cache(&self) -> &DiskCache {
        &self.cache
    }

    pub fn metadata_cache(&self) -> &MetadataCache {
        &self.metadata_cache
    }

    /// Drop cached content and log cache statistics
    pub fn shutdown(&self) {
        self.metadata_cache.log_metrics();
        self.cache.clear();
    }
}
