//! Media file types

use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::StoreType;

/// Descriptive record for one stored audio object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Backend object identifier (empty until assigned)
    #[serde(default)]
    pub id: String,
    /// Display name, used as the episode title and upload name
    pub name: String,
    /// MIME type of the content
    pub content_type: String,
    #[serde(default)]
    pub author: String,
    /// Content size in bytes
    pub size: u64,
    /// Base64-encoded thumbnail image (empty if none)
    #[serde(default)]
    pub thumbnail: String,
    pub created_at: DateTime<Utc>,
    /// Backend holding the content (None until saved)
    #[serde(default)]
    pub store_type: Option<StoreType>,
}

impl FileMetadata {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            content_type: content_type.into(),
            author: String::new(),
            size: 0,
            thumbnail: String::new(),
            created_at: Utc::now(),
            store_type: None,
        }
    }

    pub fn has_thumbnail(&self) -> bool {
        !self.thumbnail.is_empty()
    }

    /// Decode the base64 thumbnail
    pub fn thumbnail_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(self.thumbnail.as_bytes())
    }
}

/// Content plus metadata, handed to the coordinator for saving
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub metadata: FileMetadata,
    pub content: Bytes,
}

impl MediaFile {
    pub fn new(metadata: FileMetadata, content: impl Into<Bytes>) -> Self {
        Self {
            metadata,
            content: content.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }
}
