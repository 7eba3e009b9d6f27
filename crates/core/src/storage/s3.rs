//! S3-compatible repository built on the AWS SDK.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::Object;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use super::error::StorageError;
use super::repository::StorageRepository;
use super::types::{
    DownloadFileResponse, ListObjectsParams, ObjectParams, ScratchFile, StorageObject,
    StorageType, UploadContent, download_file_name, normalize_prefix,
};

/// Repository mapping each operation onto one S3 API call.
pub struct S3Repository {
    client: Client,
    scratch_root: PathBuf,
}

impl S3Repository {
    /// Create a repository around an already configured client.
    ///
    /// Downloads are written below `scratch_root`.
    #[must_use]
    pub fn new(client: Client, scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            scratch_root: scratch_root.into(),
        }
    }

    /// Fetch the requested page, following continuation tokens from the
    /// first page. Pages past the end are empty.
    async fn list_page(&self, list: &ListObjectsParams) -> Result<Vec<Object>, StorageError> {
        let prefix = list.normalized_prefix();
        let mut continuation_token: Option<String> = None;
        let mut remaining = list.page;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&list.store_name)
                .prefix(prefix)
                .max_keys(list.max_per_page)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| {
                    let err = StorageError::from(e);
                    error!(error = %err, bucket = %list.store_name, prefix = %prefix, "Couldn't list objects");
                    err
                })?;

            if remaining == 0 {
                debug!(
                    bucket = %list.store_name,
                    prefix = %prefix,
                    page = list.page,
                    count = response.contents().len(),
                    "Listed objects"
                );
                return Ok(response.contents().to_vec());
            }

            let Some(next) = response.next_continuation_token() else {
                return Ok(Vec::new());
            };
            continuation_token = Some(next.to_string());
            remaining -= 1;
        }
    }

    /// User metadata of one object; failures leave the metadata empty.
    async fn object_metadata(&self, store_name: &str, key: &str) -> HashMap<String, String> {
        match self
            .client
            .head_object()
            .bucket(store_name)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response.metadata().cloned().unwrap_or_default(),
            Err(e) => {
                let err = StorageError::from(e);
                warn!(error = %err, bucket = %store_name, key = %key, "Couldn't fetch object metadata");
                HashMap::new()
            }
        }
    }
}

fn presigning_config(expires_in: Duration) -> Result<PresigningConfig, StorageError> {
    PresigningConfig::expires_in(expires_in).map_err(|e| StorageError::InvalidExpiry(e.to_string()))
}

/// `CopySource` value for a server-side copy.
fn copy_source(current: &ObjectParams) -> String {
    format!("{}/{}", current.store_name, normalize_prefix(&current.key))
}

fn listed_object(store_name: &str, object: &Object) -> StorageObject {
    StorageObject {
        store_name: store_name.to_string(),
        key: object.key().unwrap_or_default().to_string(),
        last_modified: object.last_modified().and_then(|t| t.to_millis().ok()),
        etag: object.e_tag().map(String::from),
        size: object.size(),
        metadata: HashMap::new(),
    }
}

fn non_empty(metadata: HashMap<String, String>) -> Option<HashMap<String, String>> {
    (!metadata.is_empty()).then_some(metadata)
}

#[async_trait]
impl StorageRepository for S3Repository {
    fn storage_type(&self) -> StorageType {
        StorageType::S3
    }

    async fn store_names(&self) -> Result<Vec<String>, StorageError> {
        let response = self.client.list_buckets().send().await.map_err(|e| {
            let err = StorageError::from(e);
            error!(error = %err, "Couldn't list buckets");
            err
        })?;

        Ok(response
            .buckets()
            .iter()
            .filter_map(|bucket| bucket.name().map(String::from))
            .collect())
    }

    async fn objects(&self, list: &ListObjectsParams) -> Result<Vec<StorageObject>, StorageError> {
        let objects = self.list_page(list).await?;
        Ok(objects
            .iter()
            .map(|object| listed_object(&list.store_name, object))
            .collect())
    }

    async fn objects_with_metadata(
        &self,
        list: &ListObjectsParams,
    ) -> Result<Vec<StorageObject>, StorageError> {
        let objects = self.list_page(list).await?;
        let mut result = Vec::with_capacity(objects.len());

        for object in &objects {
            let mut storage_object = listed_object(&list.store_name, object);
            storage_object.metadata = self
                .object_metadata(&list.store_name, &storage_object.key)
                .await;
            result.push(storage_object);
        }

        Ok(result)
    }

    async fn get_object(&self, params: &ObjectParams) -> Result<StorageObject, StorageError> {
        let response = self
            .client
            .head_object()
            .bucket(&params.store_name)
            .key(&params.key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(HeadObjectError::is_not_found) {
                    return StorageError::not_found(params);
                }
                let err = StorageError::from(e);
                error!(error = %err, bucket = %params.store_name, key = %params.key, "Couldn't get object");
                err
            })?;

        Ok(StorageObject {
            store_name: params.store_name.clone(),
            key: params.key.clone(),
            last_modified: response.last_modified().and_then(|t| t.to_millis().ok()),
            etag: response.e_tag().map(String::from),
            size: response.content_length(),
            metadata: response.metadata().cloned().unwrap_or_default(),
        })
    }

    async fn upload(
        &self,
        params: &ObjectParams,
        metadata: HashMap<String, String>,
        content: UploadContent,
    ) -> Result<StorageObject, StorageError> {
        let size = i64::try_from(content.len()).ok();

        let response = self
            .client
            .put_object()
            .bucket(&params.store_name)
            .key(&params.key)
            .set_metadata(non_empty(metadata.clone()))
            .set_content_type(content.content_type)
            .body(ByteStream::from(content.data))
            .send()
            .await
            .map_err(|e| {
                let err = StorageError::from(e);
                error!(error = %err, bucket = %params.store_name, key = %params.key, "Couldn't upload object");
                err
            })?;

        info!(bucket = %params.store_name, key = %params.key, size = ?size, "Object uploaded");

        Ok(StorageObject {
            etag: response.e_tag().map(String::from),
            size,
            metadata,
            ..StorageObject::stamped_now(params)
        })
    }

    async fn presign_upload_link(
        &self,
        params: &ObjectParams,
        mime_type: &str,
        metadata: HashMap<String, String>,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let request = self
            .client
            .put_object()
            .bucket(&params.store_name)
            .key(&params.key)
            .content_type(mime_type)
            .set_metadata(non_empty(metadata))
            .presigned(presigning_config(expires_in)?)
            .await
            .map_err(|e| {
                let err = StorageError::from(e);
                error!(error = %err, bucket = %params.store_name, key = %params.key, "Couldn't presign upload");
                err
            })?;

        Ok(request.uri().to_string())
    }

    async fn download(&self, params: &ObjectParams) -> Result<DownloadFileResponse, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&params.store_name)
            .key(&params.key)
            .send()
            .await
            .map_err(|e| {
                let err = StorageError::from(e);
                error!(error = %err, bucket = %params.store_name, key = %params.key, "Couldn't get object");
                err
            })?;

        let file_name = download_file_name(&params.key);
        let content_type = response.content_type().map(String::from);
        let scratch = ScratchFile::create(&self.scratch_root, file_name).await?;
        let mut file = tokio::fs::File::create(scratch.path()).await?;

        let mut body = response.body;
        while let Some(chunk) = body.try_next().await.map_err(|e| {
            error!(error = %e, bucket = %params.store_name, key = %params.key, "Couldn't read object body");
            StorageError::provider(e.to_string())
        })? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!(bucket = %params.store_name, key = %params.key, path = %scratch.path().display(), "Object downloaded");

        Ok(DownloadFileResponse::new(
            scratch,
            file_name,
            content_type.as_deref(),
        ))
    }

    async fn presign_download_link(
        &self,
        params: &ObjectParams,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let request = self
            .client
            .get_object()
            .bucket(&params.store_name)
            .key(&params.key)
            .presigned(presigning_config(expires_in)?)
            .await
            .map_err(|e| {
                let err = StorageError::from(e);
                error!(error = %err, bucket = %params.store_name, key = %params.key, "Couldn't presign download");
                err
            })?;

        Ok(request.uri().to_string())
    }

    async fn delete(&self, params: &ObjectParams) -> Result<bool, StorageError> {
        let response = self
            .client
            .delete_object()
            .bucket(&params.store_name)
            .key(&params.key)
            .send()
            .await
            .map_err(|e| {
                let err = StorageError::from(e);
                error!(error = %err, bucket = %params.store_name, key = %params.key, "Couldn't delete object");
                err
            })?;

        info!(bucket = %params.store_name, key = %params.key, "Object deleted");
        Ok(response.delete_marker().unwrap_or(false))
    }

    async fn copy(
        &self,
        current: &ObjectParams,
        destination: &ObjectParams,
    ) -> Result<StorageObject, StorageError> {
        let response = self
            .client
            .copy_object()
            .bucket(&destination.store_name)
            .key(&destination.key)
            .copy_source(copy_source(current))
            .send()
            .await
            .map_err(|e| {
                let err = StorageError::from(e);
                error!(
                    error = %err,
                    source_bucket = %current.store_name,
                    source_key = %current.key,
                    destination_bucket = %destination.store_name,
                    destination_key = %destination.key,
                    "Couldn't copy object"
                );
                err
            })?;

        Ok(StorageObject {
            etag: response
                .copy_object_result()
                .and_then(|result| result.e_tag())
                .map(String::from),
            ..StorageObject::stamped_now(destination)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
    use aws_sdk_s3::operation::copy_object::CopyObjectOutput;
    use aws_sdk_s3::operation::delete_object::DeleteObjectOutput;
    use aws_sdk_s3::operation::head_object::HeadObjectOutput;
    use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
    use aws_sdk_s3::primitives::DateTime;
    use aws_sdk_s3::types::CopyObjectResult;
    use aws_sdk_s3::types::error::NotFound;
    use aws_smithy_mocks::{RuleMode, mock, mock_client};

    fn offline_client() -> Client {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url("http://localhost:9000")
            .force_path_style(true)
            .credentials_provider(Credentials::new("test", "test", None, None, "test"))
            .build();
        Client::from_conf(config)
    }

    #[test]
    fn test_copy_source_strips_leading_slashes() {
        assert_eq!(
            copy_source(&ObjectParams::new("bucket1", "/docs/report.pdf")),
            "bucket1/docs/report.pdf"
        );
        assert_eq!(
            copy_source(&ObjectParams::new("bucket1", "docs/report.pdf")),
            "bucket1/docs/report.pdf"
        );
    }

    #[test]
    fn test_listed_object_mapping() {
        let object = Object::builder()
            .key("docs/report.pdf")
            .e_tag("\"abc\"")
            .size(42)
            .last_modified(DateTime::from_millis(1_700_000_000_000))
            .build();

        let mapped = listed_object("bucket1", &object);
        assert_eq!(mapped.store_name, "bucket1");
        assert_eq!(mapped.key, "docs/report.pdf");
        assert_eq!(mapped.etag.as_deref(), Some("\"abc\""));
        assert_eq!(mapped.size, Some(42));
        assert_eq!(mapped.last_modified, Some(1_700_000_000_000));
        assert!(mapped.metadata.is_empty());
    }

    #[test]
    fn test_non_empty_metadata() {
        assert!(non_empty(HashMap::new()).is_none());
        let metadata = HashMap::from([("author".to_string(), "alice".to_string())]);
        assert_eq!(non_empty(metadata.clone()), Some(metadata));
    }

    #[test]
    fn test_presigning_config_rejects_more_than_a_week() {
        assert!(presigning_config(Duration::from_secs(15 * 60)).is_ok());
        let err = presigning_config(Duration::from_secs(8 * 24 * 60 * 60)).unwrap_err();
        assert!(matches!(err, StorageError::InvalidExpiry(_)));
    }

    #[tokio::test]
    async fn test_presign_download_link_is_local() {
        let repository = S3Repository::new(offline_client(), std::env::temp_dir());
        let url = repository
            .presign_download_link(
                &ObjectParams::new("bucket1", "docs/report.pdf"),
                Duration::from_secs(900),
            )
            .await
            .unwrap();

        assert!(url.starts_with("http://localhost:9000/bucket1/docs/report.pdf?"));
        assert!(url.contains("X-Amz-Expires=900"));
    }

    #[tokio::test]
    async fn test_presign_upload_link_is_local() {
        let repository = S3Repository::new(offline_client(), std::env::temp_dir());
        let url = repository
            .presign_upload_link(
                &ObjectParams::new("bucket1", "docs/report.pdf"),
                "application/pdf",
                HashMap::new(),
                Duration::from_millis(60_000),
            )
            .await
            .unwrap();

        assert!(url.starts_with("http://localhost:9000/bucket1/docs/report.pdf?"));
        assert!(url.contains("X-Amz-Expires=60"));
    }

    #[test]
    fn test_storage_type() {
        let repository = S3Repository::new(offline_client(), std::env::temp_dir());
        assert_eq!(repository.storage_type(), StorageType::S3);
    }

    fn repository_with(client: Client) -> S3Repository {
        S3Repository::new(client, std::env::temp_dir())
    }

    fn listing(keys: &[&str], next_token: Option<&str>) -> ListObjectsV2Output {
        let mut builder = ListObjectsV2Output::builder()
            .is_truncated(next_token.is_some())
            .set_next_continuation_token(next_token.map(String::from));
        for key in keys {
            builder = builder.contents(Object::builder().key(*key).size(1).build());
        }
        builder.build()
    }

    #[tokio::test]
    async fn test_objects_follows_continuation_tokens_to_requested_page() {
        let first = mock!(Client::list_objects_v2)
            .match_requests(|req| {
                req.continuation_token().is_none() && req.prefix() == Some("docs")
            })
            .then_output(|| listing(&["docs/a.txt"], Some("tok1")));
        let second = mock!(Client::list_objects_v2)
            .match_requests(|req| req.continuation_token() == Some("tok1"))
            .then_output(|| listing(&["docs/b.txt"], None));
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&first, &second]);
        let repository = repository_with(client);

        let list = ListObjectsParams::new("bucket1")
            .with_max_per_page(1)
            .with_prefix("/docs");

        let page = repository.objects(&list.clone().with_page(0)).await.unwrap();
        let keys: Vec<&str> = page.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["docs/a.txt"]);

        let page = repository.objects(&list.with_page(1)).await.unwrap();
        let keys: Vec<&str> = page.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["docs/b.txt"]);
        assert_eq!(page[0].store_name, "bucket1");

        assert_eq!(first.num_calls(), 2);
        assert_eq!(second.num_calls(), 1);
    }

    #[tokio::test]
    async fn test_objects_past_last_page_is_empty() {
        let first = mock!(Client::list_objects_v2)
            .match_requests(|req| req.continuation_token().is_none())
            .then_output(|| listing(&["a.txt"], Some("tok1")));
        let second = mock!(Client::list_objects_v2)
            .match_requests(|req| req.continuation_token() == Some("tok1"))
            .then_output(|| listing(&["b.txt"], None));
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&first, &second]);
        let repository = repository_with(client);

        let page = repository
            .objects(&ListObjectsParams::new("bucket1").with_max_per_page(1).with_page(5))
            .await
            .unwrap();

        assert!(page.is_empty());
        assert_eq!(second.num_calls(), 1);
    }

    #[tokio::test]
    async fn test_objects_with_metadata_tolerates_failed_head() {
        let list = mock!(Client::list_objects_v2)
            .then_output(|| listing(&["a.txt", "b.txt"], None));
        let head_ok = mock!(Client::head_object)
            .match_requests(|req| req.key() == Some("a.txt"))
            .then_output(|| HeadObjectOutput::builder().metadata("author", "alice").build());
        let head_failed = mock!(Client::head_object)
            .match_requests(|req| req.key() == Some("b.txt"))
            .then_error(|| HeadObjectError::NotFound(NotFound::builder().build()));
        let client = mock_client!(
            aws_sdk_s3,
            RuleMode::MatchAny,
            [&list, &head_ok, &head_failed]
        );
        let repository = repository_with(client);

        let objects = repository
            .objects_with_metadata(&ListObjectsParams::new("bucket1"))
            .await
            .unwrap();

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].key, "a.txt");
        assert_eq!(objects[0].metadata.get("author").map(String::as_str), Some("alice"));
        assert_eq!(objects[1].key, "b.txt");
        assert!(objects[1].metadata.is_empty());
    }

    #[tokio::test]
    async fn test_get_object_missing_key_is_not_found() {
        let head = mock!(Client::head_object)
            .then_error(|| HeadObjectError::NotFound(NotFound::builder().build()));
        let client = mock_client!(aws_sdk_s3, [&head]);
        let repository = repository_with(client);

        let err = repository
            .get_object(&ObjectParams::new("b", "k"))
            .await
            .unwrap_err();

        match err {
            StorageError::NotFound { store_name, key } => {
                assert_eq!(store_name, "b");
                assert_eq!(key, "k");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_object_maps_head_output() {
        let head = mock!(Client::head_object).then_output(|| {
            HeadObjectOutput::builder()
                .e_tag("\"abc\"")
                .content_length(42)
                .metadata("author", "alice")
                .build()
        });
        let client = mock_client!(aws_sdk_s3, [&head]);
        let repository = repository_with(client);

        let object = repository
            .get_object(&ObjectParams::new("bucket1", "docs/report.pdf"))
            .await
            .unwrap();

        assert_eq!(object.key, "docs/report.pdf");
        assert_eq!(object.etag.as_deref(), Some("\"abc\""));
        assert_eq!(object.size, Some(42));
        assert_eq!(object.metadata.get("author").map(String::as_str), Some("alice"));
    }

    #[tokio::test]
    async fn test_delete_reports_delete_marker() {
        let versioned = mock!(Client::delete_object)
            .match_requests(|req| req.key() == Some("versioned.txt"))
            .then_output(|| DeleteObjectOutput::builder().delete_marker(true).build());
        let plain = mock!(Client::delete_object)
            .match_requests(|req| req.key() == Some("plain.txt"))
            .then_output(|| DeleteObjectOutput::builder().build());
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&versioned, &plain]);
        let repository = repository_with(client);

        assert!(
            repository
                .delete(&ObjectParams::new("bucket1", "versioned.txt"))
                .await
                .unwrap()
        );
        assert!(
            !repository
                .delete(&ObjectParams::new("bucket1", "plain.txt"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_copy_sends_normalized_source_and_returns_etag() {
        let copy = mock!(Client::copy_object)
            .match_requests(|req| {
                req.copy_source() == Some("bucket1/a.txt")
                    && req.bucket() == Some("bucket2")
                    && req.key() == Some("b.txt")
            })
            .then_output(|| {
                CopyObjectOutput::builder()
                    .copy_object_result(CopyObjectResult::builder().e_tag("\"e1\"").build())
                    .build()
            });
        let client = mock_client!(aws_sdk_s3, [&copy]);
        let repository = repository_with(client);

        let copied = repository
            .copy(
                &ObjectParams::new("bucket1", "/a.txt"),
                &ObjectParams::new("bucket2", "b.txt"),
            )
            .await
            .unwrap();

        assert_eq!(copied.store_name, "bucket2");
        assert_eq!(copied.key, "b.txt");
        assert_eq!(copied.etag.as_deref(), Some("\"e1\""));
        assert_eq!(copy.num_calls(), 1);
    }
}
