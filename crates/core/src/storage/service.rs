//! Storage service: resolves a repository per storage type and forwards calls.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::error::StorageError;
use super::repository::StorageRepository;
use super::types::{
    DownloadFileResponse, ListObjectsParams, MultipartFile, ObjectParams, StorageObject,
    StorageType, UploadContent, mime_type_or_default, presign_expiry,
};

/// Registry of repositories keyed by storage type.
///
/// Built once at startup and read-only afterwards.
pub struct StorageService {
    repositories: HashMap<StorageType, Arc<dyn StorageRepository>>,
}

/// Builder for [`StorageService`].
#[derive(Default)]
pub struct StorageServiceBuilder {
    repositories: HashMap<StorageType, Arc<dyn StorageRepository>>,
}

impl StorageServiceBuilder {
    /// Register `repository` for `storage_type`, replacing any previous one.
    #[must_use]
    pub fn register(
        mut self,
        storage_type: StorageType,
        repository: Arc<dyn StorageRepository>,
    ) -> Self {
        if storage_type == StorageType::Unknown {
            warn!("Ignoring repository registered for the unknown storage type");
            return self;
        }
        self.repositories.insert(storage_type, repository);
        self
    }

    /// Finish the registry.
    #[must_use]
    pub fn build(self) -> StorageService {
        StorageService {
            repositories: self.repositories,
        }
    }
}

impl StorageService {
    /// Start an empty registry.
    #[must_use]
    pub fn builder() -> StorageServiceBuilder {
        StorageServiceBuilder::default()
    }

    /// Registered storage types, in declaration order.
    #[must_use]
    pub fn supported_types(&self) -> Vec<StorageType> {
        let mut types: Vec<StorageType> = self.repositories.keys().copied().collect();
        types.sort();
        types
    }

    /// Repository registered for `storage_type`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedType` if none is registered.
    pub fn repository(
        &self,
        storage_type: StorageType,
    ) -> Result<&Arc<dyn StorageRepository>, StorageError> {
        self.repositories.get(&storage_type).ok_or_else(|| {
            debug!(storage_type = %storage_type, "No repository registered");
            StorageError::UnsupportedType(storage_type)
        })
    }

    /// Names of every accessible bucket/container.
    pub async fn store_names(&self, storage_type: StorageType) -> Result<Vec<String>, StorageError> {
        self.repository(storage_type)?.store_names().await
    }

    /// One page of objects.
    pub async fn objects(
        &self,
        storage_type: StorageType,
        list: &ListObjectsParams,
    ) -> Result<Vec<StorageObject>, StorageError> {
        self.repository(storage_type)?.objects(list).await
    }

    /// One page of objects with their user metadata.
    pub async fn objects_with_metadata(
        &self,
        storage_type: StorageType,
        list: &ListObjectsParams,
    ) -> Result<Vec<StorageObject>, StorageError> {
        self.repository(storage_type)?
            .objects_with_metadata(list)
            .await
    }

    /// Metadata of one object.
    pub async fn get_object(
        &self,
        storage_type: StorageType,
        params: &ObjectParams,
    ) -> Result<StorageObject, StorageError> {
        self.repository(storage_type)?.get_object(params).await
    }

    /// Upload raw content. Absent metadata is stored as empty.
    pub async fn upload(
        &self,
        storage_type: StorageType,
        params: &ObjectParams,
        metadata: Option<HashMap<String, String>>,
        content: UploadContent,
    ) -> Result<StorageObject, StorageError> {
        self.repository(storage_type)?
            .upload(params, metadata.unwrap_or_default(), content)
            .await
    }

    /// Upload the file part of a multipart form.
    ///
    /// A folder-like key (empty or ending in `/`) gets the part's file name
    /// appended.
    pub async fn upload_multipart(
        &self,
        storage_type: StorageType,
        params: &ObjectParams,
        metadata: Option<HashMap<String, String>>,
        file: MultipartFile,
    ) -> Result<StorageObject, StorageError> {
        let repository = self.repository(storage_type)?;
        let params = ObjectParams::new(params.store_name.clone(), file.resolve_key(&params.key));
        repository
            .upload(&params, metadata.unwrap_or_default(), file.into())
            .await
    }

    /// Presigned PUT URL.
    ///
    /// Blank MIME type defaults to `application/octet-stream`, a missing or
    /// zero expiry (milliseconds) to 15 minutes.
    pub async fn presign_upload_link(
        &self,
        storage_type: StorageType,
        params: &ObjectParams,
        mime_type: Option<&str>,
        metadata: Option<HashMap<String, String>>,
        exp_millis: Option<u64>,
    ) -> Result<String, StorageError> {
        self.repository(storage_type)?
            .presign_upload_link(
                params,
                mime_type_or_default(mime_type),
                metadata.unwrap_or_default(),
                presign_expiry(exp_millis),
            )
            .await
    }

    /// Copy the object body into a scratch file.
    pub async fn download(
        &self,
        storage_type: StorageType,
        params: &ObjectParams,
    ) -> Result<DownloadFileResponse, StorageError> {
        self.repository(storage_type)?.download(params).await
    }

    /// Presigned GET URL; a missing or zero expiry defaults to 15 minutes.
    pub async fn presign_download_link(
        &self,
        storage_type: StorageType,
        params: &ObjectParams,
        exp_millis: Option<u64>,
    ) -> Result<String, StorageError> {
        self.repository(storage_type)?
            .presign_download_link(params, presign_expiry(exp_millis))
            .await
    }

    /// Delete every object under a prefix.
    pub async fn delete_all(
        &self,
        storage_type: StorageType,
        store_name: &str,
        prefix: &str,
    ) -> Result<bool, StorageError> {
        self.repository(storage_type)?
            .delete_all(store_name, prefix)
            .await
    }

    /// Delete one object.
    pub async fn delete(
        &self,
        storage_type: StorageType,
        params: &ObjectParams,
    ) -> Result<bool, StorageError> {
        self.repository(storage_type)?.delete(params).await
    }

    /// Server-side copy.
    pub async fn copy(
        &self,
        storage_type: StorageType,
        current: &ObjectParams,
        destination: &ObjectParams,
    ) -> Result<StorageObject, StorageError> {
        self.repository(storage_type)?
            .copy(current, destination)
            .await
    }

    /// Server-side copy of a whole prefix.
    pub async fn copy_all(
        &self,
        storage_type: StorageType,
        source_store: &str,
        source_prefix: &str,
        target_store: &str,
        target_prefix: &str,
    ) -> Result<Vec<StorageObject>, StorageError> {
        self.repository(storage_type)?
            .copy_all(source_store, source_prefix, target_store, target_prefix)
            .await
    }

    /// Copy then delete the source. See [`StorageRepository::move_object`].
    pub async fn move_object(
        &self,
        storage_type: StorageType,
        current: &ObjectParams,
        destination: &ObjectParams,
    ) -> Result<StorageObject, StorageError> {
        self.repository(storage_type)?
            .move_object(current, destination)
            .await
    }
}
