//! Object storage behind a registry of per-provider repositories.
//!
//! ```text
//! HTTP handler ──► StorageService ──► StorageType ──► Arc<dyn StorageRepository>
//!                                                        └─ S3Repository (aws-sdk-s3)
//! ```
//!
//! Only S3 has a repository. FTP and SharePoint are recognised tags that
//! resolve to `UnsupportedType` until something is registered for them.

mod config;
mod error;
mod repository;
mod s3;
mod service;
mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::s3_client;
pub use error::StorageError;
pub use repository::StorageRepository;
pub use s3::S3Repository;
pub use service::{StorageService, StorageServiceBuilder};
pub use types::{
    DEFAULT_MIME_TYPE, DEFAULT_PRESIGN_EXPIRY, DownloadFileResponse, ListObjectsParams,
    MultipartFile, ObjectParams, ScratchFile, StorageObject, StorageType, UploadContent,
    download_file_name, mime_type_or_default, normalize_prefix, presign_expiry,
};
