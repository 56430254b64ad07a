//! Remote object store contract
//!
//! A backend mints identifiers, uploads content under them, and opens
//! seekable readers synthesized from range requests.

pub mod errors;
pub mod memory;
pub mod reader;
pub mod retry;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::media::MediaFile;
use crate::principal::Principal;

pub use errors::{MediaError, StoreError};
pub use memory::InMemoryStore;
pub use reader::{RangeSource, SeekableRemoteReader};
pub use retry::{RetryPolicy, RetryingStore};

/// Which registered backend a user saves to or a file lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Google Drive v3
    #[default]
    GoogleDrive,
    /// Process memory, for local runs
    Memory,
}

impl StoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreType::GoogleDrive => "google-drive",
            StoreType::Memory => "memory",
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability contract over one remote object backend
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Mint a fresh identifier scoped to the principal's account
    async fn generate_id(&self, principal: &Principal) -> Result<String, StoreError>;

    /// Upload `file.content` under `file.metadata.id`.
    ///
    /// The identifier must already be assigned. Uploads are not retried by
    /// implementations.
    async fn save(&self, principal: &Principal, file: &MediaFile) -> Result<(), StoreError>;

    /// Open a random-access reader over the whole object
    async fn get(
        &self,
        principal: &Principal,
        file_id: &str,
    ) -> Result<SeekableRemoteReader, StoreError>;
}

/// Shared check for `save` implementations
pub(crate) fn require_id(file: &MediaFile) -> Result<&str, StoreError> {
    let id = file.id();
    if id.is_empty() {
        return Err(StoreError::InvalidArgument(
            "file id must be assigned before upload".to_string(),
        ));
    }
    Ok(id)
}
