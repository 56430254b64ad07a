//! Google Drive API Client
//!
//! Provides bearer-authenticated access to a user's Drive for id generation,
//! multipart uploads and byte-range downloads.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info};

use super::types::{DriveFile, ErrorEnvelope, GeneratedIds, UploadMetadata};
use crate::media::MediaFile;
use crate::principal::Principal;
use crate::store::{require_id, RangeSource, RemoteStore, SeekableRemoteReader, StoreError};

/// Drive v3 metadata endpoint
pub const DRIVE_API_URL: &str = "https://www.googleapis.com/drive/v3";

/// Drive v3 upload endpoint
pub const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";

/// HTTP client timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the Drive API
#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub api_url: String,
    pub upload_url: String,
    /// Folder new uploads are placed in (Drive root if None)
    pub folder_id: Option<String>,
    pub request_timeout: Duration,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_url: DRIVE_API_URL.to_string(),
            upload_url: DRIVE_UPLOAD_URL.to_string(),
            folder_id: None,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

/// Drive API client; credentials come from the principal on every call
pub struct DriveClient {
    http_client: Client,
    api_url: String,
    upload_url: String,
    folder_id: Option<String>,
}

/// Turn a non-success response into a StoreError
async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::from_status(
        status.as_u16(),
        &ErrorEnvelope::message_from(&body),
    ))
}

/// Build a `multipart/related` body: JSON metadata part, then the media part
pub(crate) fn multipart_related_body(
    boundary: &str,
    metadata_json: &str,
    content_type: &str,
    content: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + metadata_json.len() + 256);
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{}\r\n",
            boundary, metadata_json
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("--{}\r\nContent-Type: {}\r\n\r\n", boundary, content_type).as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

/// Pick the requested window out of a full-object response
fn slice_window(body: Bytes, start: u64, end: u64) -> Bytes {
    let len = body.len() as u64;
    if start >= len {
        return Bytes::new();
    }
    let end = end.min(len - 1);
    body.slice(start as usize..=end as usize)
}

impl DriveClient {
    pub fn new(config: DriveConfig) -> Result<Self, StoreError> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::BackendUnavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            upload_url: config.upload_url.trim_end_matches('/').to_string(),
            folder_id: config.folder_id,
        })
    }

    fn file_url(&self, file_id: &str) -> String {
        format!("{}/files/{}", self.api_url, urlencoding::encode(file_id))
    }

    /// Ask Drive for one fresh file id
    pub async fn generate_id(&self, principal: &Principal) -> Result<String, StoreError> {
        principal.ensure_fresh()?;
        let url = format!("{}/files/generateIds", self.api_url);

        let response = self
            .http_client
            .get(&url)
            .header("Authorization", principal.bearer())
            .query(&[("count", "1"), ("space", "drive")])
            .send()
            .await?;
        let ids: GeneratedIds = check_status(response).await?.json().await?;

        let id = ids
            .ids
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::BackendUnavailable("generateIds returned no ids".to_string()))?;
        debug!(user = %principal.username, file_id = %id, "Generated Drive file id");
        Ok(id)
    }

    /// Fetch file metadata (id, name, size, mime type)
    pub async fn file_info(&self, principal: &Principal, file_id: &str) -> Result<DriveFile, StoreError> {
        principal.ensure_fresh()?;
        let response = self
            .http_client
            .get(self.file_url(file_id))
            .header("Authorization", principal.bearer())
            .query(&[("fields", "id,name,size,mimeType")])
            .send()
            .await?;
        let file: DriveFile = check_status(response).await?.json().await?;
        Ok(file)
    }

    /// Download bytes `start..=end` of a file
    pub async fn download_range(
        &self,
        principal: &Principal,
        file_id: &str,
        start: u64,
        end: u64,
    ) -> Result<Bytes, StoreError> {
        principal.ensure_fresh()?;
        debug!(file_id = file_id, start, end, "Downloading range from Drive");

        let response = self
            .http_client
            .get(self.file_url(file_id))
            .header("Authorization", principal.bearer())
            .header("Range", format!("bytes={}-{}", start, end))
            .query(&[("alt", "media")])
            .send()
            .await?;

        let response = check_status(response).await?;
        let ranged = response.status() == StatusCode::PARTIAL_CONTENT;
        let body = response.bytes().await?;

        if ranged {
            Ok(body)
        } else {
            // Range header ignored: the body is the whole object
            Ok(slice_window(body, start, end))
        }
    }

    /// Upload content under a pre-generated id with a multipart request
    pub async fn upload(&self, principal: &Principal, file: &MediaFile) -> Result<DriveFile, StoreError> {
        let file_id = require_id(file)?;
        principal.ensure_fresh()?;

        let metadata = UploadMetadata {
            id: file_id,
            name: &file.metadata.name,
            mime_type: &file.metadata.content_type,
            parents: self.folder_id.as_deref().map(|folder| vec![folder]),
        };
        let metadata_json = serde_json::to_string(&metadata)
            .map_err(|e| StoreError::InvalidArgument(format!("cannot encode upload metadata: {}", e)))?;

        let boundary = format!("youpod-{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related_body(
            &boundary,
            &metadata_json,
            &file.metadata.content_type,
            &file.content,
        );

        info!(
            user = %principal.username,
            file_id = file_id,
            size = file.content.len(),
            content_type = %file.metadata.content_type,
            "Uploading file to Drive"
        );

        let response = self
            .http_client
            .post(format!("{}/files", self.upload_url))
            .header("Authorization", principal.bearer())
            .header("Content-Type", format!("multipart/related; boundary={}", boundary))
            .query(&[("uploadType", "multipart"), ("fields", "id,name,size,mimeType")])
            .body(body)
            .send()
            .await?;
        let uploaded: DriveFile = check_status(response).await?.json().await?;

        info!(file_id = %uploaded.id, size = uploaded.size, "File uploaded to Drive");
        Ok(uploaded)
    }
}

#[async_trait]
impl RangeSource for DriveClient {
    async fn fetch_range(
        &self,
        principal: &Principal,
        file_id: &str,
        start: u64,
        end: u64,
    ) -> Result<Bytes, StoreError> {
        self.download_range(principal, file_id, start, end).await
    }
}

/// RemoteStore over a user's Google Drive
#[derive(Clone)]
pub struct DriveStore {
    client: Arc<DriveClient>,
}

impl DriveStore {
    pub fn new(config: DriveConfig) -> Result<Self, StoreError> {
        Ok(Self {
            client: Arc::new(DriveClient::new(config)?),
        })
    }
}

#[async_trait]
impl RemoteStore for DriveStore {
    fn name(&self) -> &'static str {
        "google-drive"
    }

    async fn generate_id(&self, principal: &Principal) -> Result<String, StoreError> {
        self.client.generate_id(principal).await
    }

    async fn save(&self, principal: &Principal, file: &MediaFile) -> Result<(), StoreError> {
        self.client.upload(principal, file).await.map(|_| ())
    }

    async fn get(
        &self,
        principal: &Principal,
        file_id: &str,
    ) -> Result<SeekableRemoteReader, StoreError> {
        let info = self.client.file_info(principal, file_id).await?;
        debug!(file_id = file_id, size = info.size, "Opened Drive file for reading");

        let source: Arc<dyn RangeSource> = self.client.clone();
        Ok(SeekableRemoteReader::new(source, principal.clone(), file_id, info.size))
    }
}
