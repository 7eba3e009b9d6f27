//! Object storage routes.
//!
//! Every route takes the storage type as its first path segment. Unknown or
//! unregistered types are rejected by the service before any provider call.

use std::collections::HashMap;

use axum::{
    Json, Router,
    body::Body,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
    http::header,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use futures::StreamExt;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::{
    AppState,
    error::{ApiError, ApiResult},
    extractors::{AppJson, AppQuery},
};
use smarthub_core::storage::{
    DownloadFileResponse, ListObjectsParams, MultipartFile, ObjectParams, StorageObject,
    StorageType,
};
use smarthub_shared::AppError;

/// Creates the storage routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/support", get(storage_types))
        .route("/{type}/stores", get(store_names))
        .route("/{type}/objects", get(objects))
        .route("/{type}/objects/detail", get(objects_with_metadata))
        .route("/{type}/object", get(get_object).delete(delete_object))
        .route("/{type}/object/all", delete(delete_all))
        .route("/{type}/upload", post(upload))
        .route("/{type}/upload-link", get(presign_upload_link))
        .route("/{type}/download-link", get(presign_download_link))
        .route("/{type}/download", get(download))
        .route("/{type}/copy", put(copy))
        .route("/{type}/copy/all", put(copy_all))
        .route("/{type}/move", put(move_object))
}

// ============================================================================
// Request Types
// ============================================================================

/// Query for object listings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Bucket to list.
    #[serde(default)]
    pub store_name: String,
    /// Page size.
    #[serde(default = "default_max_object_per_page")]
    pub max_object_per_page: i32,
    /// Zero-based page index.
    #[serde(default)]
    pub page: u32,
    /// Key prefix; a leading `/` is ignored.
    #[serde(default)]
    pub prefix: String,
}

fn default_max_object_per_page() -> i32 {
    ListObjectsParams::DEFAULT_MAX_PER_PAGE
}

impl From<ListQuery> for ListObjectsParams {
    fn from(query: ListQuery) -> Self {
        Self::new(query.store_name)
            .with_max_per_page(query.max_object_per_page)
            .with_page(query.page)
            .with_prefix(query.prefix)
    }
}

/// Query identifying one object.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectQuery {
    /// Bucket name.
    #[serde(default)]
    pub store_name: String,
    /// Object key.
    #[serde(default)]
    pub key: String,
}

impl From<ObjectQuery> for ObjectParams {
    fn from(query: ObjectQuery) -> Self {
        Self::new(query.store_name, query.key)
    }
}

/// Query for a presigned download link.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLinkQuery {
    /// Bucket name.
    #[serde(default)]
    pub store_name: String,
    /// Object key.
    #[serde(default)]
    pub key: String,
    /// Validity in milliseconds.
    #[serde(default)]
    pub exp: Option<u64>,
}

/// Query for bulk deletion.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixQuery {
    /// Bucket name.
    #[serde(default)]
    pub store_name: String,
    /// Key prefix.
    #[serde(default)]
    pub prefix: String,
}

/// Body of a presigned upload request.
#[derive(Debug, Deserialize)]
pub struct PresignUploadRequest {
    /// Bucket name.
    #[serde(alias = "storeName")]
    pub store_name: String,
    /// Object key.
    pub key: String,
    /// Content type the client will upload with.
    #[serde(default, alias = "mimeType")]
    pub mime_type: Option<String>,
    /// User metadata to attach.
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
    /// Validity in milliseconds.
    #[serde(default)]
    pub exp: Option<u64>,
}

/// Body of a copy or move request.
#[derive(Debug, Deserialize)]
pub struct ObjectMovementRequest {
    /// Source bucket.
    #[serde(alias = "currentStoreName")]
    pub current_store_name: String,
    /// Source key.
    #[serde(alias = "currentKey")]
    pub current_key: String,
    /// Destination bucket.
    #[serde(alias = "destinationStoreName")]
    pub destination_store_name: String,
    /// Destination key.
    #[serde(alias = "destinationKey")]
    pub destination_key: String,
}

impl ObjectMovementRequest {
    fn into_params(self) -> (ObjectParams, ObjectParams) {
        (
            ObjectParams::new(self.current_store_name, self.current_key),
            ObjectParams::new(self.destination_store_name, self.destination_key),
        )
    }
}

/// Body of a bulk copy request.
#[derive(Debug, Deserialize)]
pub struct CopyAllRequest {
    /// Source bucket.
    #[serde(alias = "sourceStoreName")]
    pub source_store_name: String,
    /// Source prefix.
    #[serde(default, alias = "sourcePrefix")]
    pub source_prefix: String,
    /// Target bucket.
    #[serde(alias = "targetStoreName")]
    pub target_store_name: String,
    /// Target prefix.
    #[serde(default, alias = "targetPrefix")]
    pub target_prefix: String,
}

/// Fields of a multipart upload form.
struct UploadForm {
    store_name: String,
    key: String,
    metadata: Option<HashMap<String, String>>,
    file: MultipartFile,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut store_name = String::new();
        let mut key = String::new();
        let mut metadata = None;
        let mut file = None;

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    let file_name = field.file_name().map(ToString::to_string);
                    let content_type = field.content_type().map(ToString::to_string);
                    let data = field.bytes().await?;
                    file = Some(MultipartFile {
                        file_name,
                        content_type,
                        data,
                    });
                }
                "storeName" | "store_name" => store_name = field.text().await?,
                "key" => key = field.text().await?,
                "metadata" => metadata = parse_metadata(&field.text().await?)?,
                _ => debug!(field = %name, "Ignoring unknown multipart field"),
            }
        }

        let file = file.ok_or_else(|| ApiError::bad_request("missing multipart field `file`"))?;
        Ok(Self {
            store_name,
            key,
            metadata,
            file,
        })
    }
}

/// Parse the optional JSON metadata form field.
fn parse_metadata(raw: &str) -> ApiResult<Option<HashMap<String, String>>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| ApiError::bad_request(format!("invalid metadata: {e}")))
}

fn storage_type(raw: &str) -> StorageType {
    StorageType::from(raw)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /support - registered storage types.
async fn storage_types(State(state): State<AppState>) -> Json<Vec<StorageType>> {
    Json(state.storage.supported_types())
}

/// GET /{type}/stores - bucket names.
async fn store_names(
    State(state): State<AppState>,
    Path(raw_type): Path<String>,
) -> ApiResult<Json<Vec<String>>> {
    let names = state
        .storage
        .store_names(storage_type(&raw_type))
        .await
        .map_err(ApiError::read)?;
    Ok(Json(names))
}

/// GET /{type}/objects - one page of objects.
async fn objects(
    State(state): State<AppState>,
    Path(raw_type): Path<String>,
    AppQuery(query): AppQuery<ListQuery>,
) -> ApiResult<Json<Vec<StorageObject>>> {
    let list = ListObjectsParams::from(query);
    let objects = state
        .storage
        .objects(storage_type(&raw_type), &list)
        .await
        .map_err(ApiError::read)?;
    Ok(Json(objects))
}

/// GET /{type}/objects/detail - one page of objects with metadata.
async fn objects_with_metadata(
    State(state): State<AppState>,
    Path(raw_type): Path<String>,
    AppQuery(query): AppQuery<ListQuery>,
) -> ApiResult<Json<Vec<StorageObject>>> {
    let list = ListObjectsParams::from(query);
    let objects = state
        .storage
        .objects_with_metadata(storage_type(&raw_type), &list)
        .await
        .map_err(ApiError::read)?;
    Ok(Json(objects))
}

/// GET /{type}/object - object metadata.
async fn get_object(
    State(state): State<AppState>,
    Path(raw_type): Path<String>,
    AppQuery(query): AppQuery<ObjectQuery>,
) -> ApiResult<Json<StorageObject>> {
    let params = ObjectParams::from(query);
    let object = state
        .storage
        .get_object(storage_type(&raw_type), &params)
        .await
        .map_err(ApiError::read)?;
    Ok(Json(object))
}

/// DELETE /{type}/object - delete one object.
async fn delete_object(
    State(state): State<AppState>,
    Path(raw_type): Path<String>,
    AppQuery(query): AppQuery<ObjectQuery>,
) -> ApiResult<Json<bool>> {
    let params = ObjectParams::from(query);
    let delete_marker = state
        .storage
        .delete(storage_type(&raw_type), &params)
        .await
        .map_err(ApiError::read)?;

    info!(store = %params.store_name, key = %params.key, "Object deleted");
    Ok(Json(delete_marker))
}

/// DELETE /{type}/object/all - delete everything under a prefix.
async fn delete_all(
    State(state): State<AppState>,
    Path(raw_type): Path<String>,
    AppQuery(query): AppQuery<PrefixQuery>,
) -> ApiResult<Json<bool>> {
    let deleted = state
        .storage
        .delete_all(storage_type(&raw_type), &query.store_name, &query.prefix)
        .await
        .map_err(ApiError::read)?;
    Ok(Json(deleted))
}

/// POST /{type}/upload - multipart upload.
async fn upload(
    State(state): State<AppState>,
    Path(raw_type): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<StorageObject>> {
    let form = UploadForm::read(multipart?).await?;
    let params = ObjectParams::new(form.store_name, form.key);

    let object = state
        .storage
        .upload_multipart(storage_type(&raw_type), &params, form.metadata, form.file)
        .await
        .map_err(ApiError::upload)?;

    info!(
        store = %object.store_name,
        key = %object.key,
        size = object.size.unwrap_or_default(),
        "Object uploaded"
    );
    Ok(Json(object))
}

/// GET /{type}/upload-link - presigned PUT URL.
async fn presign_upload_link(
    State(state): State<AppState>,
    Path(raw_type): Path<String>,
    AppJson(body): AppJson<PresignUploadRequest>,
) -> ApiResult<Json<String>> {
    let params = ObjectParams::new(body.store_name, body.key);
    let url = state
        .storage
        .presign_upload_link(
            storage_type(&raw_type),
            &params,
            body.mime_type.as_deref(),
            body.metadata,
            body.exp,
        )
        .await
        .map_err(ApiError::read)?;
    Ok(Json(url))
}

/// GET /{type}/download-link - presigned GET URL.
async fn presign_download_link(
    State(state): State<AppState>,
    Path(raw_type): Path<String>,
    AppQuery(query): AppQuery<DownloadLinkQuery>,
) -> ApiResult<Json<String>> {
    let params = ObjectParams::new(query.store_name, query.key);
    let url = state
        .storage
        .presign_download_link(storage_type(&raw_type), &params, query.exp)
        .await
        .map_err(ApiError::read)?;
    Ok(Json(url))
}

/// GET /{type}/download - stream the object body.
///
/// The scratch file is held by the body stream and removed once the stream
/// is dropped.
async fn download(
    State(state): State<AppState>,
    Path(raw_type): Path<String>,
    AppQuery(query): AppQuery<ObjectQuery>,
) -> ApiResult<Response> {
    let params = ObjectParams::from(query);
    let DownloadFileResponse {
        file: scratch,
        content_type,
        disposition,
    } = state
        .storage
        .download(storage_type(&raw_type), &params)
        .await
        .map_err(ApiError::read)?;

    let file = tokio::fs::File::open(scratch.path())
        .await
        .map_err(|e| AppError::Internal(format!("failed to open download: {e}")))?;

    let stream = ReaderStream::new(file).map(move |chunk| {
        let _held = &scratch;
        chunk
    });

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// PUT /{type}/copy - server-side copy.
async fn copy(
    State(state): State<AppState>,
    Path(raw_type): Path<String>,
    AppJson(body): AppJson<ObjectMovementRequest>,
) -> ApiResult<Json<StorageObject>> {
    let (current, destination) = body.into_params();
    let object = state
        .storage
        .copy(storage_type(&raw_type), &current, &destination)
        .await
        .map_err(ApiError::read)?;

    info!(
        source_store = %current.store_name,
        source_key = %current.key,
        destination_store = %destination.store_name,
        destination_key = %destination.key,
        "Object copied"
    );
    Ok(Json(object))
}

/// PUT /{type}/copy/all - server-side copy of a prefix.
async fn copy_all(
    State(state): State<AppState>,
    Path(raw_type): Path<String>,
    AppJson(body): AppJson<CopyAllRequest>,
) -> ApiResult<Json<Vec<StorageObject>>> {
    let objects = state
        .storage
        .copy_all(
            storage_type(&raw_type),
            &body.source_store_name,
            &body.source_prefix,
            &body.target_store_name,
            &body.target_prefix,
        )
        .await
        .map_err(ApiError::read)?;
    Ok(Json(objects))
}

/// PUT /{type}/move - copy then delete the source.
async fn move_object(
    State(state): State<AppState>,
    Path(raw_type): Path<String>,
    AppJson(body): AppJson<ObjectMovementRequest>,
) -> ApiResult<Json<StorageObject>> {
    let (current, destination) = body.into_params();
    let object = state
        .storage
        .move_object(storage_type(&raw_type), &current, &destination)
        .await
        .map_err(ApiError::read)?;
    Ok(Json(object))
}
