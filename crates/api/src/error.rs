//! HTTP error responses.

use axum::{
    Json,
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, error};

use smarthub_core::storage::StorageError;
use smarthub_shared::AppError;

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Error returned by handlers, rendered as `{"error": code, "message": text}`.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl ApiError {
    /// Malformed request input.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(AppError::BadRequest(msg.into()))
    }

    /// Map a storage failure on any operation other than upload.
    pub fn read(err: StorageError) -> Self {
        Self(match err {
            StorageError::UnsupportedType(_) => AppError::Unsupported(err.to_string()),
            StorageError::NotImplemented { .. } => AppError::NotImplemented(err.to_string()),
            _ => AppError::Upstream(err.to_string()),
        })
    }

    /// Map a storage failure on upload.
    pub fn upload(err: StorageError) -> Self {
        Self(match err {
            StorageError::UnsupportedType(_) => AppError::Unsupported(err.to_string()),
            StorageError::NotImplemented { .. } => AppError::NotImplemented(err.to_string()),
            _ => AppError::UploadFailed(err.to_string()),
        })
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::bad_request(err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(error = %self.0, status = %status, "Request failed");
        } else {
            debug!(error = %self.0, status = %status, "Request rejected");
        }

        (
            status,
            Json(json!({
                "error": self.0.error_code(),
                "message": self.0.to_string(),
            })),
        )
            .into_response()
    }
}
