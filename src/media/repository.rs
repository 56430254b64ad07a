//! Metadata repository
//!
//! Persists one FileMetadata record per object identifier.

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{debug, info};

use super::types::FileMetadata;
use crate::cache::disk::validate_file_id;
use crate::principal::Principal;
use crate::store::StoreError;

/// Storage contract for metadata records
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Load the record for `file_id`; `None` when there is none
    async fn get_file_metadata(&self, file_id: &str) -> Result<Option<FileMetadata>, StoreError>;

    /// Insert or replace the record keyed by `metadata.id`
    async fn save_file_metadata(
        &self,
        principal: &Principal,
        metadata: &FileMetadata,
    ) -> Result<(), StoreError>;
}

fn require_record_id(metadata: &FileMetadata) -> Result<&str, StoreError> {
    if metadata.id.is_empty() {
        return Err(StoreError::InvalidArgument(
            "metadata record has no file id".to_string(),
        ));
    }
    Ok(&metadata.id)
}

/// JSON documents, one file per identifier
pub struct FsMetadataRepository {
    dir: PathBuf,
}

impl FsMetadataRepository {
    /// Open (and create if needed) a repository rooted at `dir`
    pub fn new(dir: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), "Metadata repository opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, file_id: &str) -> Result<PathBuf, StoreError> {
        validate_file_id(file_id)?;
        Ok(self.dir.join(format!("{}.json", file_id)))
    }
}

/// Write `contents` next to `path` and rename it into place
fn write_atomically(dir: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut staging = tempfile::Builder::new()
        .prefix(".record-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    staging.write_all(contents)?;
    staging.as_file().sync_all()?;
    staging.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl MetadataRepository for FsMetadataRepository {
    async fn get_file_metadata(&self, file_id: &str) -> Result<Option<FileMetadata>, StoreError> {
        let path = self.record_path(file_id)?;
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let metadata = serde_json::from_slice(&raw).map_err(|e| {
            StoreError::Io(std::io::Error::new(
                ErrorKind::InvalidData,
                format!("corrupt metadata record {}: {}", path.display(), e),
            ))
        })?;
        Ok(Some(metadata))
    }

    async fn save_file_metadata(
        &self,
        principal: &Principal,
        metadata: &FileMetadata,
    ) -> Result<(), StoreError> {
        let file_id = require_record_id(metadata)?;
        let path = self.record_path(file_id)?;
        let contents = serde_json::to_vec_pretty(metadata)
            .map_err(|e| StoreError::InvalidArgument(format!("cannot encode metadata: {}", e)))?;

        let dir = self.dir.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &contents))
            .await
            .map_err(std::io::Error::other)??;

        debug!(
            user = %principal.username,
            file_id = file_id,
            path = %path.display(),
            "Saved metadata record"
        );
        Ok(())
    }
}

/// Records kept in process memory
#[derive(Default)]
pub struct InMemoryMetadataRepository {
    records: RwLock<HashMap<String, FileMetadata>>,
}

impl InMemoryMetadataRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl MetadataRepository for InMemoryMetadataRepository {
    async fn get_file_metadata(&self, file_id: &str) -> Result<Option<FileMetadata>, StoreError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(file_id).cloned())
    }

    async fn save_file_metadata(
        &self,
        _principal: &Principal,
        metadata: &FileMetadata,
    ) -> Result<(), StoreError> {
        let file_id = require_record_id(metadata)?;
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file_id.to_string(), metadata.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> FileMetadata {
        let mut metadata = FileMetadata::new("Morning talk", "audio/mpeg");
        metadata.id = id.to_string();
        metadata.author = "Some Channel".to_string();
        metadata.size = 1234;
        metadata
    }

    #[tokio::test]
    async fn test_fs_repository_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsMetadataRepository::new(dir.path().join("meta")).unwrap();
        let alice = Principal::new("alice", "t");

        assert!(repo.get_file_metadata("1abc").await.unwrap().is_none());

        let saved = record("1abc");
        repo.save_file_metadata(&alice, &saved).await.unwrap();
        assert_eq!(repo.get_file_metadata("1abc").await.unwrap(), Some(saved));
        assert!(repo.dir().join("1abc.json").exists());
    }

    #[tokio::test]
    async fn test_fs_repository_replaces_record() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsMetadataRepository::new(dir.path().to_path_buf()).unwrap();
        let alice = Principal::new("alice", "t");

        repo.save_file_metadata(&alice, &record("x")).await.unwrap();
        let mut updated = record("x");
        updated.name = "Renamed".to_string();
        repo.save_file_metadata(&alice, &updated).await.unwrap();

        let loaded = repo.get_file_metadata("x").await.unwrap().unwrap();
        assert_eq!(loaded.name, "Renamed");
        // No staging files left behind
        assert_eq!(std::fs::read_dir(repo.dir()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_fs_repository_rejects_bad_ids() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsMetadataRepository::new(dir.path().to_path_buf()).unwrap();
        let alice = Principal::new("alice", "t");

        assert!(matches!(
            repo.get_file_metadata("../secret").await,
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            repo.save_file_metadata(&alice, &record("")).await,
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_fs_repository_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsMetadataRepository::new(dir.path().to_path_buf()).unwrap();
        std::fs::write(repo.dir().join("bad.json"), b"{ not json").unwrap();

        assert!(matches!(
            repo.get_file_metadata("bad").await,
            Err(StoreError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_in_memory_repository() {
        let repo = InMemoryMetadataRepository::new();
        let alice = Principal::new("alice", "t");

        repo.save_file_metadata(&alice, &record("a")).await.unwrap();
        assert_eq!(repo.len(), 1);
        assert_eq!(
            repo.get_file_metadata("a").await.unwrap().unwrap().author,
            "Some Channel"
        );
        assert!(repo.get_file_metadata("b").await.unwrap().is_none());
    }
}
