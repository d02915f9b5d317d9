//! HTTP endpoints over the versioned file store.
//!
//! Routes:
//! - `POST   /api/upload`           multipart field `file` -> new file
//! - `GET    /api/files`            list manifests
//! - `GET    /api/files/{id}`       download content
//! - `GET    /api/files/{id}/meta`  manifest only
//! - `PUT    /api/files/{id}`       multipart field `file` -> new version
//! - `DELETE /api/files/{id}`       remove the manifest
//!
//! The engine is synchronous; every call runs on the blocking pool.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chunkstore::{
    ErrorKind, FileId, FileManifest, FsChunkBackend, FsManifestBackend, StoreError,
    VersionedFileStore,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// The on-disk store the service runs against.
pub type DiskStore = VersionedFileStore<FsChunkBackend, FsManifestBackend>;

/// Default cap on request bodies: 32 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 32 << 20;

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DiskStore>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: DiskStore) -> Self {
        Self {
            store: Arc::new(store),
            start_time: Instant::now(),
        }
    }
}

pub fn router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(serve_root))
        .route("/health", get(handle_health))
        .route("/api/upload", post(upload_file))
        .route("/api/files", get(list_files))
        .route(
            "/api/files/{id}",
            get(download_file).put(update_file).delete(delete_file),
        )
        .route("/api/files/{id}/meta", get(file_meta))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error response: status code plus `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match err.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "storage operation failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

/// Run a store call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> chunkstore::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(format!("storage task failed: {e}")))?
        .map_err(ApiError::from)
}

fn parse_id(raw: &str) -> Result<FileId, ApiError> {
    raw.parse().map_err(ApiError::from)
}

/// An uploaded multipart `file` field.
struct Upload {
    file_name: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

async fn take_file_field(mut multipart: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("error parsing form: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("error retrieving file: {e}")))?;
        return Ok(Upload {
            file_name,
            content_type,
            data: data.to_vec(),
        });
    }
    Err(ApiError::bad_request("missing multipart field \"file\""))
}

/// Stored name for an upload: the multipart filename unless it is missing or blank.
fn upload_name(file_name: Option<String>) -> String {
    file_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "upload".to_string())
}

/// Serve root discovery endpoint
async fn serve_root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "chunkdrive",
        "version": env!("CARGO_PKG_VERSION"),
        "links": {
            "files": "/api/files",
            "upload": "/api/upload",
            "health": "/health",
        }
    }))
}

/// Health check endpoint
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "chunk_size": state.store.chunk_store().chunk_size(),
    }))
}

#[derive(Serialize)]
struct UploadResponse {
    file_id: String,
    message: &'static str,
}

async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let upload = take_file_field(multipart).await?;
    let name = upload_name(upload.file_name);
    let content_type = upload
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let store = Arc::clone(&state.store);
    let manifest = blocking(move || {
        store.create(&name, &content_type, &mut Cursor::new(upload.data))
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            file_id: manifest.id.to_string(),
            message: "File uploaded successfully",
        }),
    ))
}

#[derive(Serialize)]
struct FileListResponse {
    files: Vec<FileManifest>,
    total: usize,
}

async fn list_files(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let store = Arc::clone(&state.store);
    let files = blocking(move || store.list()).await?;
    Ok(Json(FileListResponse {
        total: files.len(),
        files,
    }))
}

async fn file_meta(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let store = Arc::clone(&state.store);
    let manifest = blocking(move || store.get(&id)).await?;
    Ok(Json(manifest))
}

async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let store = Arc::clone(&state.store);
    let (manifest, content) = blocking(move || {
        let mut content = Vec::new();
        let manifest = store.read(&id, &mut content)?;
        Ok((manifest, content))
    })
    .await?;

    let content_type = HeaderValue::from_str(&manifest.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        sanitize_filename(&manifest.name)
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(content.len())),
        ],
        content,
    )
        .into_response())
}

/// Keep header-safe printable ASCII, replacing quotes and anything else.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}

#[derive(Serialize)]
struct UpdateResponse {
    #[serde(flatten)]
    manifest: FileManifest,
    changed_chunks: usize,
}

async fn update_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let upload = take_file_field(multipart).await?;

    let store = Arc::clone(&state.store);
    let report =
        blocking(move || store.update_with_report(&id, &mut Cursor::new(upload.data))).await?;

    Ok(Json(UpdateResponse {
        changed_chunks: report.diff.changed.len(),
        manifest: report.manifest,
    }))
}

async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let store = Arc::clone(&state.store);
    blocking(move || store.delete(&id)).await?;
    Ok(Json(serde_json::json!({ "message": "File deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("a\"b.txt"), "a_b.txt");
        assert_eq!(sanitize_filename("naïve\r\n.txt"), "na_ve__.txt");
    }

    #[test]
    fn test_upload_name_falls_back_when_blank() {
        assert_eq!(upload_name(Some("a.txt".into())), "a.txt");
        assert_eq!(upload_name(Some(String::new())), "upload");
        assert_eq!(upload_name(Some("   ".into())), "upload");
        assert_eq!(upload_name(None), "upload");
    }

    #[test]
    fn test_store_error_status_mapping() {
        let not_found: ApiError = StoreError::file_not_found("x").into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);

        let invalid: ApiError = StoreError::Validation("nope".into()).into();
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);

        let io: ApiError = StoreError::ReadOnly.into();
        assert_eq!(io.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
