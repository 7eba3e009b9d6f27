//! Backend capability trait.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use super::error::StorageError;
use super::types::{
    DownloadFileResponse, ListObjectsParams, ObjectParams, StorageObject, StorageType,
    UploadContent,
};

/// Object operations against one storage provider.
///
/// Implementations are registered once at startup in a
/// [`StorageService`](super::StorageService) and shared across requests.
#[async_trait]
pub trait StorageRepository: Send + Sync {
    /// Storage type this repository serves.
    fn storage_type(&self) -> StorageType;

    /// Names of every accessible bucket/container.
    async fn store_names(&self) -> Result<Vec<String>, StorageError>;

    /// One page of objects under the listing prefix.
    async fn objects(&self, list: &ListObjectsParams) -> Result<Vec<StorageObject>, StorageError>;

    /// One page of objects, each with its user metadata.
    async fn objects_with_metadata(
        &self,
        list: &ListObjectsParams,
    ) -> Result<Vec<StorageObject>, StorageError>;

    /// Metadata of one object, without its body.
    async fn get_object(&self, params: &ObjectParams) -> Result<StorageObject, StorageError>;

    /// Store `content` under `params` with the given user metadata.
    async fn upload(
        &self,
        params: &ObjectParams,
        metadata: HashMap<String, String>,
        content: UploadContent,
    ) -> Result<StorageObject, StorageError>;

    /// Time-limited URL authorizing a client-side PUT.
    async fn presign_upload_link(
        &self,
        params: &ObjectParams,
        mime_type: &str,
        metadata: HashMap<String, String>,
        expires_in: Duration,
    ) -> Result<String, StorageError>;

    /// Copy the object body into a local scratch file.
    async fn download(&self, params: &ObjectParams) -> Result<DownloadFileResponse, StorageError>;

    /// Time-limited URL authorizing a client-side GET.
    async fn presign_download_link(
        &self,
        params: &ObjectParams,
        expires_in: Duration,
    ) -> Result<String, StorageError>;

    /// Delete one object. Returns whether a delete marker was produced.
    async fn delete(&self, params: &ObjectParams) -> Result<bool, StorageError>;

    /// Delete every object under `prefix`.
    async fn delete_all(&self, _store_name: &str, _prefix: &str) -> Result<bool, StorageError> {
        Err(StorageError::not_implemented(
            "delete_all",
            self.storage_type(),
        ))
    }

    /// Server-side copy of one object.
    async fn copy(
        &self,
        current: &ObjectParams,
        destination: &ObjectParams,
    ) -> Result<StorageObject, StorageError>;

    /// Server-side copy of every object under a prefix.
    async fn copy_all(
        &self,
        _source_store: &str,
        _source_prefix: &str,
        _target_store: &str,
        _target_prefix: &str,
    ) -> Result<Vec<StorageObject>, StorageError> {
        Err(StorageError::not_implemented("copy_all", self.storage_type()))
    }

    /// Copy `current` to `destination`, then delete `current`.
    ///
    /// Not transactional. A failed copy deletes nothing. A failed delete after
    /// a successful copy leaves both objects in place and is reported as
    /// [`StorageError::PartialMove`].
    async fn move_object(
        &self,
        current: &ObjectParams,
        destination: &ObjectParams,
    ) -> Result<StorageObject, StorageError> {
        let copied = self.copy(current, destination).await?;

        if let Err(e) = self.delete(current).await {
            error!(
                error = %e,
                source_store = %current.store_name,
                source_key = %current.key,
                destination_store = %destination.store_name,
                destination_key = %destination.key,
                "Copied object but could not delete the source"
            );
            return Err(StorageError::partial_move(current, destination, &e));
        }

        info!(
            source_store = %current.store_name,
            source_key = %current.key,
            destination_store = %destination.store_name,
            destination_key = %destination.key,
            "Object moved"
        );
        Ok(copied)
    }
}
