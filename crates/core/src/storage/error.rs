//! Storage error types.

use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use thiserror::Error;

use super::types::{ObjectParams, StorageType};

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No repository is registered for the requested storage type.
    #[error("{0} is not supported")]
    UnsupportedType(StorageType),

    /// The backend does not implement this operation.
    #[error("{operation} is not implemented for {storage_type}")]
    NotImplemented {
        /// Operation name.
        operation: &'static str,
        /// Backend that lacks it.
        storage_type: StorageType,
    },

    /// Object does not exist.
    #[error("object not found: {store_name}/{key}")]
    NotFound {
        /// Bucket or container name.
        store_name: String,
        /// Object key.
        key: String,
    },

    /// Presign validity rejected by the provider.
    #[error("invalid presign expiry: {0}")]
    InvalidExpiry(String),

    /// Provider call failed; the message is the provider's.
    #[error("{0}")]
    Provider(String),

    /// Copy succeeded but removing the source failed; both objects exist.
    #[error(
        "copied {source_store}/{source_key} to {destination_store}/{destination_key} \
         but could not delete the source: {reason}"
    )]
    PartialMove {
        /// Source bucket.
        source_store: String,
        /// Source key.
        source_key: String,
        /// Destination bucket.
        destination_store: String,
        /// Destination key.
        destination_key: String,
        /// Error returned by the delete.
        reason: String,
    },

    /// Local filesystem error while handling scratch files.
    #[error("scratch file error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Create a not implemented error.
    #[must_use]
    pub fn not_implemented(operation: &'static str, storage_type: StorageType) -> Self {
        Self::NotImplemented {
            operation,
            storage_type,
        }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(params: &ObjectParams) -> Self {
        Self::NotFound {
            store_name: params.store_name.clone(),
            key: params.key.clone(),
        }
    }

    /// Create a provider error.
    #[must_use]
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a partial move error.
    #[must_use]
    pub fn partial_move(
        current: &ObjectParams,
        destination: &ObjectParams,
        reason: &StorageError,
    ) -> Self {
        Self::PartialMove {
            source_store: current.store_name.clone(),
            source_key: current.key.clone(),
            destination_store: destination.store_name.clone(),
            destination_key: destination.key.clone(),
            reason: reason.to_string(),
        }
    }

    /// Whether the operation is missing rather than failed.
    #[must_use]
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented { .. })
    }

    /// Whether the storage type was rejected before any I/O.
    #[must_use]
    pub fn is_unsupported_type(&self) -> bool {
        matches!(self, Self::UnsupportedType(_))
    }
}

impl<E, R> From<SdkError<E, R>> for StorageError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    fn from(err: SdkError<E, R>) -> Self {
        Self::Provider(DisplayErrorContext(&err).to_string())
    }
}
