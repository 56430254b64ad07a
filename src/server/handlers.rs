//! HTTP handlers for file content and thumbnails

use std::io::SeekFrom;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

use super::range::ByteRange;
use crate::media::MediaCoordinator;
use crate::principal::PrincipalDirectory;
use crate::store::{MediaError, StoreError};

/// Served when a record carries no content type
pub const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<MediaCoordinator>,
    pub principals: Arc<PrincipalDirectory>,
}

pub async fn health() -> &'static str {
    "ok"
}

/// Map a coordinator error to a response; details only go to the log
pub(crate) fn error_response(err: &MediaError) -> Response {
    let (status, message) = match err.kind() {
        kind if kind.is_not_found() => (StatusCode::NOT_FOUND, "File not found"),
        StoreError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
    };

    if status.is_server_error() {
        error!(error = %err, "Request failed");
    } else {
        debug!(error = %err, status = status.as_u16(), "Request rejected");
    }
    (status, message).into_response()
}

fn internal_error(context: &str, err: std::io::Error) -> Response {
    error!(error = %err, "{}", context);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

fn unknown_user(username: &str) -> Response {
    debug!(user = username, "No principal for user");
    (StatusCode::NOT_FOUND, "File not found").into_response()
}

/// GET /files/{username}/{file_id}: stream content, honoring `Range`
pub async fn get_file(
    State(state): State<AppState>,
    Path((username, file_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let file_id = file_id.strip_suffix(".mp3").unwrap_or(&file_id);
    let Some(principal) = state.principals.get(&username) else {
        return unknown_user(&username);
    };

    let metadata = match state.coordinator.get_file_metadata(principal, file_id).await {
        Ok(metadata) => metadata,
        Err(e) => return error_response(&e),
    };
    let mut file = match state.coordinator.get_file_content(principal, file_id).await {
        Ok(file) => file,
        Err(e) => return error_response(&e),
    };
    let size = match file.metadata().await {
        Ok(stat) => stat.len(),
        Err(e) => return internal_error("Failed to stat cached file", e),
    };

    let content_type = if metadata.content_type.is_empty() {
        DEFAULT_CONTENT_TYPE.to_string()
    } else {
        metadata.content_type
    };
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    match ByteRange::resolve(range, size) {
        ByteRange::Full => {
            debug!(user = %username, file_id = file_id, size = size, "Serving file");
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                    (header::CONTENT_LENGTH, size.to_string()),
                ],
                Body::from_stream(ReaderStream::new(file)),
            )
                .into_response()
        }
        ByteRange::Partial { start, end } => {
            if let Err(e) = file.seek(SeekFrom::Start(start)).await {
                return internal_error("Failed to seek cached file", e);
            }
            let len = end - start + 1;
            debug!(user = %username, file_id = file_id, start, end, size, "Serving range");
            (
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                    (header::CONTENT_LENGTH, len.to_string()),
                    (header::CONTENT_RANGE, format!("bytes {}-{}/{}", start, end, size)),
                ],
                Body::from_stream(ReaderStream::new(file.take(len))),
            )
                .into_response()
        }
        ByteRange::Unsatisfiable => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{}", size))],
        )
            .into_response(),
    }
}

/// GET /files/{username}/{file_id}/thumbnail
pub async fn get_thumbnail(
    State(state): State<AppState>,
    Path((username, file_id)): Path<(String, String)>,
) -> Response {
    let file_id = file_id.strip_suffix(".mp3").unwrap_or(&file_id);
    let Some(principal) = state.principals.get(&username) else {
        return unknown_user(&username);
    };

    let metadata = match state.coordinator.get_file_metadata(principal, file_id).await {
        Ok(metadata) => metadata,
        Err(e) => return error_response(&e),
    };
    if !metadata.has_thumbnail() {
        return (StatusCode::NOT_FOUND, "No thumbnail").into_response();
    }

    match metadata.thumbnail_bytes() {
        Ok(picture) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "image/jpeg")],
            picture,
        )
            .into_response(),
        Err(e) => {
            error!(file_id = file_id, error = %e, "Stored thumbnail is not valid base64");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}
