//! Store Error Types
//!
//! Structured error handling for remote store, cache and metadata operations.
//! Maps backend HTTP status codes to specific error variants for retry and
//! response-status decisions.

use std::fmt;

/// Error kinds surfaced by the store and cache layer
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File metadata not found: {0}")]
    MetadataNotFound(String),

    #[error("Authentication expired for '{0}', token needs refresh")]
    AuthExpired(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Unregistered store type: {0}")]
    UnregisteredStore(String),

    #[error("Local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether a retry policy may re-issue the call.
    ///
    /// Only transient transport faults qualify. Expired credentials are
    /// propagated so the caller can refresh them.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::BackendUnavailable(_))
    }

    /// Whether this error should be reported to end users as "not found"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_) | StoreError::MetadataNotFound(_)
        )
    }

    /// Create a StoreError from an HTTP status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            400 => StoreError::InvalidArgument(body.to_string()),
            401 => StoreError::AuthExpired(body.to_string()),
            404 => StoreError::NotFound(body.to_string()),
            // Drive reports quota and rate limiting as 403
            403 | 408 | 429 | 500..=599 => {
                StoreError::BackendUnavailable(format!("HTTP {}: {}", status, body))
            }
            _ => StoreError::BackendUnavailable(format!("unexpected HTTP {}: {}", status, body)),
        }
    }

    /// Attach the operation, user and identifier the error occurred under
    pub fn context(self, operation: &'static str, username: &str, file_id: &str) -> MediaError {
        MediaError {
            operation,
            username: username.to_string(),
            file_id: file_id.to_string(),
            source: self,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StoreError::BackendUnavailable(format!("request timed out: {}", e))
        } else {
            StoreError::BackendUnavailable(e.to_string())
        }
    }
}

/// A StoreError together with the call it came from
#[derive(Debug)]
pub struct MediaError {
    operation: &'static str,
    username: String,
    file_id: String,
    source: StoreError,
}

impl MediaError {
    /// The underlying error kind
    pub fn kind(&self) -> &StoreError {
        &self.source
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed (user '{}', file '{}'): {}",
            self.operation, self.username, self.file_id, self.source
        )
    }
}

impl std::error::Error for MediaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
