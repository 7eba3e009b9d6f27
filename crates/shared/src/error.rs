//! Application-wide error types.

use thiserror::Error;

/// Result type alias using `AppError`.
pub type AppResult<T> = Result<T, AppError>;

/// Application error types.
///
/// The message is carried verbatim so provider errors reach the client
/// unchanged.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed request input (query, path, body).
    #[error("{0}")]
    BadRequest(String),

    /// Requested storage type has no registered backend.
    #[error("{0}")]
    Unsupported(String),

    /// Storage provider rejected or failed a read, delete, copy or presign.
    #[error("{0}")]
    Upstream(String),

    /// Storage provider failed an upload.
    #[error("{0}")]
    UploadFailed(String),

    /// Operation exists in the API but has no implementation.
    #[error("{0}")]
    NotImplemented(String),

    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) | Self::Unsupported(_) | Self::Upstream(_) => 400,
            Self::NotImplemented(_) => 501,
            Self::UploadFailed(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unsupported(_) => "UNSUPPORTED_STORAGE_TYPE",
            Self::Upstream(_) => "STORAGE_ERROR",
            Self::UploadFailed(_) => "UPLOAD_FAILED",
            Self::NotImplemented(_) => "NOT_IMPLEMENTED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
