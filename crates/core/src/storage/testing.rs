//! In-memory repository for tests.
//!
//! Mirrors the S3 semantics the service and HTTP layers rely on: buckets must
//! exist, deleting a missing key succeeds, heads of missing keys are
//! `NotFound`. Failures can be injected for copy and delete.

use std::collections::{BTreeMap, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::error::StorageError;
use super::repository::StorageRepository;
use super::types::{
    DownloadFileResponse, ListObjectsParams, ObjectParams, ScratchFile, StorageObject,
    StorageType, UploadContent, download_file_name, normalize_prefix,
};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    metadata: HashMap<String, String>,
    etag: String,
    last_modified: i64,
}

type Buckets = BTreeMap<String, BTreeMap<String, StoredObject>>;

/// Repository keeping buckets and objects in memory.
pub struct MemoryRepository {
    storage_type: StorageType,
    scratch_root: PathBuf,
    buckets: Mutex<Buckets>,
    downloads: Mutex<Vec<PathBuf>>,
    calls: AtomicUsize,
    fail_copies: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryRepository {
    /// Empty repository serving `storage_type`.
    #[must_use]
    pub fn new(storage_type: StorageType) -> Self {
        Self {
            storage_type,
            scratch_root: std::env::temp_dir(),
            buckets: Mutex::new(BTreeMap::new()),
            downloads: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            fail_copies: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Add an empty bucket.
    #[must_use]
    pub fn with_bucket(self, name: &str) -> Self {
        self.buckets().entry(name.to_string()).or_default();
        self
    }

    /// Store an object directly, bypassing the call counter.
    pub fn insert(&self, store_name: &str, key: &str, data: impl Into<Bytes>) {
        let data = data.into();
        let object = StoredObject {
            etag: etag_for(&data),
            data,
            content_type: None,
            metadata: HashMap::new(),
            last_modified: chrono::Utc::now().timestamp_millis(),
        };
        self.buckets()
            .entry(store_name.to_string())
            .or_default()
            .insert(key.to_string(), object);
    }

    /// Whether `key` exists in `store_name`.
    #[must_use]
    pub fn contains(&self, store_name: &str, key: &str) -> bool {
        self.buckets()
            .get(store_name)
            .is_some_and(|objects| objects.contains_key(key))
    }

    /// Stored bytes of one object.
    #[must_use]
    pub fn data(&self, store_name: &str, key: &str) -> Option<Bytes> {
        self.buckets()
            .get(store_name)
            .and_then(|objects| objects.get(key))
            .map(|object| object.data.clone())
    }

    /// Number of trait calls served so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Scratch paths handed out by `download`.
    #[must_use]
    pub fn downloaded_paths(&self) -> Vec<PathBuf> {
        self.downloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make every subsequent copy fail.
    pub fn fail_copies(&self) {
        self.fail_copies.store(true, Ordering::SeqCst);
    }

    /// Make every subsequent delete fail.
    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    fn buckets(&self) -> MutexGuard<'_, Buckets> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn stored(&self, params: &ObjectParams) -> Result<StoredObject, StorageError> {
        let buckets = self.buckets();
        let objects = buckets
            .get(&params.store_name)
            .ok_or_else(no_such_bucket)?;
        objects
            .get(&params.key)
            .cloned()
            .ok_or_else(|| StorageError::provider("NoSuchKey: The specified key does not exist."))
    }

    fn listing(
        &self,
        list: &ListObjectsParams,
        with_metadata: bool,
    ) -> Result<Vec<StorageObject>, StorageError> {
        let buckets = self.buckets();
        let objects = buckets
            .get(&list.store_name)
            .ok_or_else(no_such_bucket)?;
        let page_size = usize::try_from(list.max_per_page).unwrap_or(0);
        let skip = page_size.saturating_mul(usize::try_from(list.page).unwrap_or(usize::MAX));

        Ok(objects
            .iter()
            .filter(|(key, _)| key.starts_with(list.normalized_prefix()))
            .skip(skip)
            .take(page_size)
            .map(|(key, object)| StorageObject {
                store_name: list.store_name.clone(),
                key: key.clone(),
                last_modified: Some(object.last_modified),
                etag: Some(object.etag.clone()),
                size: i64::try_from(object.data.len()).ok(),
                metadata: if with_metadata {
                    object.metadata.clone()
                } else {
                    HashMap::new()
                },
            })
            .collect())
    }

    fn presigned(params: &ObjectParams, method: &str, expires_in: Duration) -> String {
        format!(
            "memory://{}/{}?method={method}&expires={}",
            params.store_name,
            params.key,
            expires_in.as_secs()
        )
    }
}

fn no_such_bucket() -> StorageError {
    StorageError::provider("NoSuchBucket: The specified bucket does not exist")
}

fn etag_for(data: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    format!("\"{:016x}\"", hasher.finish())
}

#[async_trait]
impl StorageRepository for MemoryRepository {
    fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    async fn store_names(&self) -> Result<Vec<String>, StorageError> {
        self.record();
        Ok(self.buckets().keys().cloned().collect())
    }

    async fn objects(&self, list: &ListObjectsParams) -> Result<Vec<StorageObject>, StorageError> {
        self.record();
        self.listing(list, false)
    }

    async fn objects_with_metadata(
        &self,
        list: &ListObjectsParams,
    ) -> Result<Vec<StorageObject>, StorageError> {
        self.record();
        self.listing(list, true)
    }

    async fn get_object(&self, params: &ObjectParams) -> Result<StorageObject, StorageError> {
        self.record();
        let buckets = self.buckets();
        let object = buckets
            .get(&params.store_name)
            .and_then(|objects| objects.get(&params.key))
            .ok_or_else(|| StorageError::not_found(params))?;

        Ok(StorageObject {
            store_name: params.store_name.clone(),
            key: params.key.clone(),
            last_modified: Some(object.last_modified),
            etag: Some(object.etag.clone()),
            size: i64::try_from(object.data.len()).ok(),
            metadata: object.metadata.clone(),
        })
    }

    async fn upload(
        &self,
        params: &ObjectParams,
        metadata: HashMap<String, String>,
        content: UploadContent,
    ) -> Result<StorageObject, StorageError> {
        self.record();
        let mut buckets = self.buckets();
        let objects = buckets
            .get_mut(&params.store_name)
            .ok_or_else(no_such_bucket)?;

        let stamped = StorageObject::stamped_now(params);
        let object = StoredObject {
            etag: etag_for(&content.data),
            data: content.data,
            content_type: content.content_type,
            metadata: metadata.clone(),
            last_modified: stamped.last_modified.unwrap_or_default(),
        };
        let result = StorageObject {
            etag: Some(object.etag.clone()),
            size: i64::try_from(object.data.len()).ok(),
            metadata,
            ..stamped
        };
        objects.insert(params.key.clone(), object);
        Ok(result)
    }

    async fn presign_upload_link(
        &self,
        params: &ObjectParams,
        mime_type: &str,
        _metadata: HashMap<String, String>,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        self.record();
        Ok(format!(
            "{}&content-type={mime_type}",
            Self::presigned(params, "PUT", expires_in)
        ))
    }

    async fn download(&self, params: &ObjectParams) -> Result<DownloadFileResponse, StorageError> {
        self.record();
        let object = self.stored(params)?;
        let file_name = download_file_name(&params.key);
        let scratch = ScratchFile::create(&self.scratch_root, file_name).await?;
        tokio::fs::write(scratch.path(), &object.data).await?;

        self.downloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(scratch.path().to_path_buf());

        Ok(DownloadFileResponse::new(
            scratch,
            file_name,
            object.content_type.as_deref(),
        ))
    }

    async fn presign_download_link(
        &self,
        params: &ObjectParams,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        self.record();
        Ok(Self::presigned(params, "GET", expires_in))
    }

    async fn delete(&self, params: &ObjectParams) -> Result<bool, StorageError> {
        self.record();
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::provider("AccessDenied: Access Denied"));
        }
        let mut buckets = self.buckets();
        let objects = buckets
            .get_mut(&params.store_name)
            .ok_or_else(no_such_bucket)?;
        objects.remove(&params.key);
        Ok(false)
    }

    async fn copy(
        &self,
        current: &ObjectParams,
        destination: &ObjectParams,
    ) -> Result<StorageObject, StorageError> {
        self.record();
        if self.fail_copies.load(Ordering::SeqCst) {
            return Err(StorageError::provider("AccessDenied: Access Denied"));
        }
        let source = ObjectParams::new(current.store_name.clone(), normalize_prefix(&current.key));
        let object = self.stored(&source)?;
        let mut buckets = self.buckets();
        let objects = buckets
            .get_mut(&destination.store_name)
            .ok_or_else(no_such_bucket)?;

        let etag = object.etag.clone();
        objects.insert(destination.key.clone(), object);
        Ok(StorageObject {
            etag: Some(etag),
            ..StorageObject::stamped_now(destination)
        })
    }
}
