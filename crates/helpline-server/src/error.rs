//! API error types shared across the HTTP handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use helpline_store::StoreError;

use crate::auth::AuthError;
use crate::blob_store::BlobError;
use crate::upload::UploadError;

/// Errors that can occur in API handlers.
///
/// Client mistakes (4xx) keep their message in the response body; server
/// faults (5xx) get a generic body and the detail stays in the logs.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Authentication,

    #[error("Not authorized for this ticket")]
    Ownership,

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedMediaType(String),

    #[error("Attachment upload failed: {0}")]
    Upload(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound("Ticket not found".to_string()),
            other => ApiError::Persistence(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(_: AuthError) -> Self {
        ApiError::Authentication
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::EmptyFile(_)
            | UploadError::TooMany { .. }
            | UploadError::TooLarge { .. } => ApiError::Validation(e.to_string()),
            UploadError::Failed { .. } => ApiError::Upload(e.to_string()),
        }
    }
}

impl From<BlobError> for ApiError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::NotFound(_) => ApiError::NotFound("Blob not found".to_string()),
            BlobError::InvalidPath(msg) => ApiError::Validation(msg),
            BlobError::Storage(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Authentication => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Ownership => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::UnsupportedMediaType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, self.to_string())
            }
            ApiError::Upload(detail) => {
                tracing::error!(error = %detail, "Attachment upload failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Attachment upload failed".to_string(),
                )
            }
            ApiError::Persistence(detail) | ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
