//! Audio uploads.
//!
//! Uploaded files are written to the upload directory under a fresh unique
//! name and served statically at `/uploads/<name>`, which gives the provider
//! a public URL for add-vocals and add-instrumental tasks.

use std::path::Path;
use std::sync::Arc;

use axum::extract::multipart::Field;
use axum::extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::error::ServerError;
use crate::schemas::common::ApiResponse;
use crate::schemas::upload::{StoredUpload, UploadedFile};
use crate::state::AppState;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
/// Room for multipart framing around a maximum-size file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;
const FIELD_NAME: &str = "audio";

#[derive(OpenApi)]
#[openapi(
    paths(upload_audio, delete_audio, list_uploads),
    components(schemas(UploadedFile, StoredUpload))
)]
pub struct UploadApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/audio",
            post(upload_audio).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD)),
        )
        .route("/audio/{filename}", delete(delete_audio))
        .route("/list", get(list_uploads))
}

/// Extension to store the upload under, if it is an accepted audio format.
///
/// The file name's extension wins; a missing or unknown one falls back to the
/// declared content type.
fn accepted_extension(file_name: &str, content_type: &str) -> Option<&'static str> {
    let by_name = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match by_name.as_deref() {
        Some("mp3") => return Some("mp3"),
        Some("wav") => return Some("wav"),
        Some("flac") => return Some("flac"),
        _ => {}
    }
    match content_type {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        _ => None,
    }
}

fn unique_name(extension: &str) -> String {
    format!(
        "audio-{}-{}.{extension}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}

/// Names handed to the delete route must stay inside the upload directory.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}

async fn write_field(field: &mut Field<'_>, path: &Path) -> Result<u64, ServerError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut size = 0usize;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ServerError::BadRequest(format!("failed to read upload: {e}")))?
    {
        size += chunk.len();
        if size > MAX_UPLOAD_BYTES {
            return Err(ServerError::BadRequest(format!(
                "file too large: the limit is {} MB",
                MAX_UPLOAD_BYTES / (1024 * 1024)
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(size as u64)
}

/// Upload an audio file.
///
/// Expects `multipart/form-data` with the file in the `audio` field. MP3, WAV
/// and FLAC up to 10 MB are accepted.
#[utoipa::path(
    post,
    path = "/api/upload/audio",
    tag = "upload",
    responses(
        (status = 200, description = "File stored", body = UploadedFile),
        (status = 400, description = "Missing, oversized or unsupported file"),
    )
)]
pub async fn upload_audio(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadedFile>>, ServerError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("failed to read multipart field: {e}")))?
    {
        if field.name() != Some(FIELD_NAME) {
            debug!(field = ?field.name(), "skipping multipart field");
            continue;
        }

        let original_name = field.file_name().unwrap_or("upload").to_owned();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_owned();
        let extension = accepted_extension(&original_name, &content_type).ok_or_else(|| {
            ServerError::BadRequest(format!(
                "only MP3, WAV and FLAC files are supported, got {content_type}"
            ))
        })?;

        let filename = unique_name(extension);
        let path = state.config.upload_dir.join(&filename);
        let size = match write_field(&mut field, &path).await {
            Ok(size) => size,
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e);
            }
        };
        if size == 0 {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(ServerError::BadRequest("uploaded file is empty".into()));
        }

        let url = state.config.upload_url(&filename);
        info!(
            filename = %filename,
            original_name = %original_name,
            size_bytes = size,
            url = %url,
            "stored uploaded audio"
        );
        return Ok(Json(ApiResponse::ok(UploadedFile {
            url,
            filename,
            size,
        })));
    }

    Err(ServerError::BadRequest(format!(
        "no file uploaded in the `{FIELD_NAME}` field"
    )))
}

#[utoipa::path(
    delete,
    path = "/api/upload/audio/{filename}",
    tag = "upload",
    params(
        ("filename" = String, Path, description = "Stored file name")
    ),
    responses(
        (status = 200, description = "File deleted"),
        (status = 400, description = "Invalid file name"),
        (status = 404, description = "File not found"),
    )
)]
pub async fn delete_audio(
    State(state): State<Arc<AppState>>,
    UrlPath(filename): UrlPath<String>,
) -> Result<Json<ApiResponse<()>>, ServerError> {
    if !is_plain_file_name(&filename) {
        return Err(ServerError::BadRequest(format!("invalid file name: {filename}")));
    }
    match tokio::fs::remove_file(state.config.upload_dir.join(&filename)).await {
        Ok(()) => {
            info!(filename = %filename, "deleted uploaded audio");
            Ok(Json(ApiResponse::success()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ServerError::NotFound(format!("file {filename} not found")))
        }
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    get,
    path = "/api/upload/list",
    tag = "upload",
    responses(
        (status = 200, description = "Stored uploads", body = [StoredUpload])
    )
)]
pub async fn list_uploads(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<StoredUpload>>>, ServerError> {
    let mut dir = match tokio::fs::read_dir(&state.config.upload_dir).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Json(ApiResponse::ok(Vec::new())));
        }
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().into_owned();
        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        files.push(StoredUpload {
            url: state.config.upload_url(&filename),
            filename,
            size: metadata.len(),
            created,
        });
    }
    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(Json(ApiResponse::ok(files)))
}
