//! Storage domain types.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, warn};
use uuid::Uuid;

/// Presigned URL validity used when the caller gives none: 15 minutes.
pub const DEFAULT_PRESIGN_EXPIRY: Duration = Duration::from_secs(15 * 60);

/// MIME type used when the caller gives none.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// File name used for downloads whose key has no usable last segment.
const FALLBACK_FILE_NAME: &str = "download";

/// Storage backend tag selected per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageType {
    /// S3-compatible object storage.
    S3,
    /// FTP server.
    Ftp,
    /// SharePoint document library.
    SharePoint,
    /// Any tag that is not recognised.
    Unknown,
}

impl StorageType {
    /// Every recognised tag, `Unknown` excluded.
    pub const KNOWN: [Self; 3] = [Self::S3, Self::Ftp, Self::SharePoint];

    /// Lowercase tag as it appears in request paths.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Ftp => "ftp",
            Self::SharePoint => "sharepoint",
            Self::Unknown => "unknown",
        }
    }
}

impl From<&str> for StorageType {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "s3" => Self::S3,
            "ftp" => Self::Ftp,
            "sharepoint" => Self::SharePoint,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StorageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Identifies one object within one bucket/container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectParams {
    /// Bucket or container name.
    pub store_name: String,
    /// Object key.
    pub key: String,
}

impl ObjectParams {
    /// Create object params.
    #[must_use]
    pub fn new(store_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into(),
            key: key.into(),
        }
    }
}

/// Object metadata record returned by repositories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageObject {
    /// Bucket or container name.
    pub store_name: String,
    /// Object key.
    pub key: String,
    /// Last modification time in Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    /// Entity tag as reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Object size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    /// User metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl StorageObject {
    /// Object record for `params` stamped with the current wall-clock time.
    #[must_use]
    pub fn stamped_now(params: &ObjectParams) -> Self {
        Self {
            store_name: params.store_name.clone(),
            key: params.key.clone(),
            last_modified: Some(chrono::Utc::now().timestamp_millis()),
            ..Self::default()
        }
    }
}

/// Arguments of an object listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListObjectsParams {
    /// Bucket or container name.
    pub store_name: String,
    /// Maximum number of objects returned per page.
    pub max_per_page: i32,
    /// Zero-based page index.
    pub page: u32,
    /// Key prefix filter; leading slashes are ignored.
    pub prefix: String,
}

impl ListObjectsParams {
    /// Default page size.
    pub const DEFAULT_MAX_PER_PAGE: i32 = 1000;

    /// Listing of the first page of `store_name` with the default page size.
    #[must_use]
    pub fn new(store_name: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into(),
            max_per_page: Self::DEFAULT_MAX_PER_PAGE,
            page: 0,
            prefix: String::new(),
        }
    }

    /// Set the page size.
    #[must_use]
    pub fn with_max_per_page(mut self, max_per_page: i32) -> Self {
        self.max_per_page = max_per_page;
        self
    }

    /// Set the page index.
    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Set the prefix filter.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Prefix with leading slashes stripped.
    #[must_use]
    pub fn normalized_prefix(&self) -> &str {
        normalize_prefix(&self.prefix)
    }
}

/// Strip every leading `/` from a key or prefix.
#[must_use]
pub fn normalize_prefix(prefix: &str) -> &str {
    prefix.trim_start_matches('/')
}

/// Body of an upload.
#[derive(Debug, Clone, Default)]
pub struct UploadContent {
    /// Raw object bytes.
    pub data: Bytes,
    /// Declared content type, stored with the object when present.
    pub content_type: Option<String>,
}

impl UploadContent {
    /// Upload body without a declared content type.
    #[must_use]
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            content_type: None,
        }
    }

    /// Set the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Body length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// File part of a multipart upload form.
#[derive(Debug, Clone, Default)]
pub struct MultipartFile {
    /// Client-side file name.
    pub file_name: Option<String>,
    /// Part content type.
    pub content_type: Option<String>,
    /// Part bytes.
    pub data: Bytes,
}

impl MultipartFile {
    /// Object key for this file: `key` itself, or `key` joined with the
    /// file name when `key` is empty or names a folder (trailing `/`).
    #[must_use]
    pub fn resolve_key(&self, key: &str) -> String {
        match self.file_name.as_deref().filter(|name| !name.is_empty()) {
            Some(name) if key.is_empty() || key.ends_with('/') => format!("{key}{name}"),
            _ => key.to_string(),
        }
    }
}

impl From<MultipartFile> for UploadContent {
    fn from(file: MultipartFile) -> Self {
        Self {
            data: file.data,
            content_type: file.content_type.filter(|t| !t.trim().is_empty()),
        }
    }
}

/// Local copy of a downloaded object.
///
/// The file lives in its own directory under the scratch root; the whole
/// directory is removed when this handle is dropped.
#[derive(Debug)]
pub struct ScratchFile {
    dir: PathBuf,
    path: PathBuf,
}

impl ScratchFile {
    /// Create an empty scratch location for `file_name` under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch directory cannot be created.
    pub async fn create(root: &Path, file_name: &str) -> io::Result<Self> {
        let dir = root.join(format!("smarthub-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(file_name);
        Ok(Self { dir, path })
    }

    /// Path of the scratch file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    // Synchronous: the directory must be gone once the handle is dropped.
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(path = %self.path.display(), "Removed scratch file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, path = %self.path.display(), "Failed to remove scratch file"),
        }
    }
}

/// Downloaded object ready to be streamed to a client.
#[derive(Debug)]
pub struct DownloadFileResponse {
    /// Local copy of the object body.
    pub file: ScratchFile,
    /// Value for the `Content-Type` header.
    pub content_type: String,
    /// Value for the `Content-Disposition` header.
    pub disposition: String,
}

impl DownloadFileResponse {
    /// Wrap a scratch file with its response headers.
    #[must_use]
    pub fn new(file: ScratchFile, file_name: &str, content_type: Option<&str>) -> Self {
        Self {
            file,
            content_type: content_type
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(DEFAULT_MIME_TYPE)
                .to_string(),
            disposition: format!("inline;filename={file_name}"),
        }
    }
}

/// Last non-empty path segment of `key`, used as the download file name.
#[must_use]
pub fn download_file_name(key: &str) -> &str {
    match key.rsplit('/').find(|segment| !segment.is_empty()) {
        Some(".." | ".") | None => FALLBACK_FILE_NAME,
        Some(segment) => segment,
    }
}

/// Presign validity for an optional millisecond count; `None` and zero fall
/// back to [`DEFAULT_PRESIGN_EXPIRY`].
#[must_use]
pub fn presign_expiry(exp_millis: Option<u64>) -> Duration {
    match exp_millis {
        Some(0) | None => DEFAULT_PRESIGN_EXPIRY,
        Some(millis) => Duration::from_millis(millis),
    }
}

/// MIME type for a presigned upload; blank values fall back to
/// [`DEFAULT_MIME_TYPE`].
#[must_use]
pub fn mime_type_or_default(mime_type: Option<&str>) -> &str {
    mime_type
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_MIME_TYPE)
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    // Stripping leading slashes twice is the same as stripping once, and
    // "/a/b" normalizes to the same prefix as "a/b".
    proptest! {
        #[test]
        fn prop_normalize_prefix_idempotent(prefix in "/{0,4}[a-z0-9/]{0,20}") {
            let once = normalize_prefix(&prefix);
            prop_assert_eq!(normalize_prefix(once), once);
            prop_assert!(!once.starts_with('/'));
        }
    }

    proptest! {
        #[test]
        fn prop_leading_slashes_do_not_matter(path in "[a-z0-9][a-z0-9/]{0,20}", slashes in 0usize..5) {
            let prefixed = format!("{}{}", "/".repeat(slashes), path);
            prop_assert_eq!(normalize_prefix(&prefixed), normalize_prefix(&path));
        }
    }

    // Any tag that is not one of the known ones parses as Unknown.
    proptest! {
        #[test]
        fn prop_unrecognised_tags_are_unknown(tag in "[a-z]{1,12}") {
            let parsed = StorageType::from(tag.as_str());
            let known = StorageType::KNOWN.iter().any(|t| t.as_str() == tag);
            prop_assert_eq!(parsed == StorageType::Unknown, !known);
        }
    }

    // The download file name never contains a path separator.
    proptest! {
        #[test]
        fn prop_download_file_name_has_no_separator(key in ".{0,40}") {
            prop_assert!(!download_file_name(&key).contains('/'));
        }
    }
}
