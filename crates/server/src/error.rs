//! Engine-error to HTTP-status mapping, in one place.

use axum::Json;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use dropgate_protocol::constants::ACTOR_HEADER;
use dropgate_upload::UploadError;

/// An error ready to leave the HTTP boundary.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "unauthorized", message)
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        let (status, code) = match &e {
            UploadError::InvalidSize(_) => (StatusCode::BAD_REQUEST, "invalid_size"),
            UploadError::InvalidFileName(_) => (StatusCode::BAD_REQUEST, "invalid_file_name"),
            UploadError::ChunkIndex { .. } => (StatusCode::BAD_REQUEST, "chunk_index"),
            UploadError::ChunkLength { .. } => (StatusCode::BAD_REQUEST, "chunk_length"),
            UploadError::QuotaExceeded { .. } => {
                (StatusCode::PAYMENT_REQUIRED, "quota_exceeded")
            }
            UploadError::Unauthorized => (StatusCode::FORBIDDEN, "unauthorized"),
            UploadError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "session_not_found"),
            UploadError::SessionExpired(_) => (StatusCode::GONE, "session_expired"),
            UploadError::ChecksumMismatch { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "checksum_mismatch")
            }
            UploadError::HashMismatch => (StatusCode::UNPROCESSABLE_ENTITY, "hash_mismatch"),
            UploadError::ChunkConflict { .. } => (StatusCode::CONFLICT, "chunk_conflict"),
            UploadError::IncompleteUpload { .. } => (StatusCode::CONFLICT, "incomplete_upload"),
            UploadError::SessionClosed { .. } => (StatusCode::CONFLICT, "session_closed"),
            UploadError::AssemblyIo(_) => (StatusCode::INTERNAL_SERVER_ERROR, "assembly_io"),
            UploadError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
        };
        Self::new(status, code, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, "request failed: {}", self.message);
        }
        let body = serde_json::json!({
            "error": self.code,
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

/// Extracts the authenticated actor id from the request headers.
///
/// Authentication itself happens upstream; by the time a request reaches
/// this service the header carries an opaque, already-verified actor id.
pub fn require_actor(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::unauthorized(format!("missing {ACTOR_HEADER} header")))
}
