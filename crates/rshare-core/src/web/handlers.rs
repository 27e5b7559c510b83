//! HTTP endpoint handlers for the Rshare web API.

#![allow(clippy::missing_errors_doc)]

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::StreamReader;

use crate::file::{FileDescriptor, DEFAULT_MIME_TYPE};
use crate::session::SessionSnapshot;
use crate::transfer::SessionTicket;

use super::error::{ApiError, ApiResult};
use super::state::SharedState;

/// Response header carrying the hex SHA-256 of a downloaded file.
pub const CHECKSUM_HEADER: &str = "x-content-sha256";

// ============================================================================
// Request and response types
// ============================================================================

/// Create session request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    /// Files the sender is about to upload
    pub files: Vec<FileDescriptor>,
}

/// Upload response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Session code
    pub code: String,
    /// File index
    pub file_index: usize,
    /// Bytes of the file received so far
    pub bytes_received: u64,
    /// Declared size of the file
    pub total_bytes: u64,
    /// Whether the file is complete
    pub complete: bool,
}

/// Download query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    /// Wait for the file to finish uploading instead of failing
    #[serde(default)]
    pub wait: bool,
}

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "ok"
    status: &'static str,
    /// Server version
    version: &'static str,
    /// Sessions currently bound to a code
    sessions: usize,
    /// Seconds since start
    uptime_secs: u64,
}

// ============================================================================
// Session handlers
// ============================================================================

/// POST /api/sessions - Create a session.
pub async fn create_session(
    State(state): State<SharedState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<SessionTicket>)> {
    let ticket = state.coordinator.create_session(request.files).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// GET /api/sessions/{code} - Progress snapshot.
pub async fn get_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.coordinator.progress(&code)?))
}

/// DELETE /api/sessions/{code} - Cancel a session.
pub async fn cancel_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> ApiResult<StatusCode> {
    state.coordinator.cancel_session(&code)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// File handlers
// ============================================================================

/// PUT /api/sessions/{code}/files/{index} - Upload (or resume) a file.
///
/// The body is appended at the file's current offset.
pub async fn upload_file(
    State(state): State<SharedState>,
    Path((code, index)): Path<(String, usize)>,
    body: Body,
) -> ApiResult<Json<UploadResponse>> {
    let session = state.coordinator.session(&code)?;
    let total_bytes = session.file(index)?.size_bytes;

    let reader = StreamReader::new(body.into_data_stream().map_err(std::io::Error::other));
    let bytes_received = state
        .coordinator
        .attach_upload_stream(&code, index, reader)
        .await?;

    Ok(Json(UploadResponse {
        code: session.code().to_string(),
        file_index: index,
        bytes_received,
        total_bytes,
        complete: bytes_received == total_bytes,
    }))
}

/// GET /api/sessions/{code}/files/{index} - Download a completed file.
pub async fn download_file(
    State(state): State<SharedState>,
    Path((code, index)): Path<(String, usize)>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    if query.wait {
        state.coordinator.wait_for_file(&code, index).await?;
    }

    let source = state.coordinator.download_source(&code, index).await?;
    let file = source.file().clone();
    let content_type = HeaderValue::from_str(&file.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MIME_TYPE));

    let checksum = source.checksum().map(String::from);
    let body = Body::from_stream(source.into_stream());

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, file.size_bytes)
        .header(header::CONTENT_DISPOSITION, content_disposition(&file.name));
    if let Some(checksum) = checksum {
        response = response.header(CHECKSUM_HEADER, checksum);
    }

    response
        .body(body)
        .map_err(|e| ApiError::internal(format!("Failed to build response: {e}")))
}

/// GET /api/health - Liveness.
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::VERSION,
        sessions: state.coordinator.store().len(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// Build an attachment `Content-Disposition` with an ASCII fallback name and
/// a UTF-8 `filename*`.
fn content_disposition(name: &str) -> String {
    use std::fmt::Write;

    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let encoded = name.bytes().fold(String::new(), |mut out, b| {
        if b.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&b) {
            out.push(char::from(b));
        } else {
            let _ = write!(out, "%{b:02X}");
        }
        out
    });

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("report 1.pdf"),
            "attachment; filename=\"report 1.pdf\"; filename*=UTF-8''report%201.pdf"
        );
    }

    #[test]
    fn test_content_disposition_escapes() {
        let value = content_disposition("naïve \"quote\".txt");
        assert!(value.contains("filename=\"na_ve _quote_.txt\""));
        assert!(value.contains("filename*=UTF-8''na%C3%AFve%20%22quote%22.txt"));
    }

    #[test]
    fn test_download_query_default() {
        let query: DownloadQuery = serde_json::from_str("{}").unwrap();
        assert!(!query.wait);
    }
}
