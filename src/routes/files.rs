//! File Routes
//!
//! The working collection over HTTP.
//!
//! Endpoints:
//! - GET /api/v1/files - List files in display order
//! - POST /api/v1/files - Upload one or more files (multipart)
//! - PUT /api/v1/files/order - Replace the whole order
//! - GET /api/v1/files/:id - Metadata panel view
//! - DELETE /api/v1/files/:id - Remove a file
//! - GET /api/v1/files/:id/content - Raw PDF bytes
//! - POST /api/v1/files/:id/rotate - Change display rotation
//! - POST /api/v1/files/:id/move - Move to a new index
//! - GET /api/v1/files/:id/extract - Download with rotation applied
//! - POST /api/v1/files/:id/merge - Download merged with another file

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::collection::{FileMetadataView, FileSummary};
use crate::error::{AppError, Result};
use crate::intake::{FileId, RawFile, PDF_MIME_TYPE};
use crate::organizer::IntakeReport;
use crate::pdf::{MergePosition, PdfBlob};
use crate::state::AppState;

/// Upload bodies may carry several files, plus room for one over the limit so
/// the validator reports it instead of the transport
const UPLOAD_BODY_FACTOR: u64 = 4;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileSummary>,
    pub total: usize,
}

impl From<Vec<FileSummary>> for FileListResponse {
    fn from(files: Vec<FileSummary>) -> Self {
        let total = files.len();
        Self { files, total }
    }
}

#[derive(Debug, Deserialize)]
pub struct RotateRequest {
    pub degrees: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub to_index: usize,
}

#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    pub ids: Vec<FileId>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractQuery {
    pub rotation: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub source_id: FileId,
    #[serde(default = "default_position")]
    pub position: MergePosition,
}

fn default_position() -> MergePosition {
    MergePosition::After
}

// ============================================================================
// Router
// ============================================================================

/// Create the files router
pub fn router(max_file_size: u64) -> Router<AppState> {
    let body_limit = max_file_size
        .saturating_mul(UPLOAD_BODY_FACTOR)
        .min(usize::MAX as u64) as usize;

    Router::new()
        .route("/", get(list_files).post(upload_files))
        .route("/order", put(reorder_files))
        .route("/:id", get(get_file).delete(delete_file))
        .route("/:id/content", get(get_content))
        .route("/:id/rotate", post(rotate_file))
        .route("/:id/move", post(move_file))
        .route("/:id/extract", get(extract_file))
        .route("/:id/merge", post(merge_file))
        .layer(DefaultBodyLimit::max(body_limit))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/files
async fn list_files(State(state): State<AppState>) -> Json<FileListResponse> {
    Json(state.organizer().list().await.into())
}

/// POST /api/v1/files
///
/// Every `file`/`files` part is taken in, in order. A `lastModified` text part
/// (milliseconds since the epoch) applies to the next file part.
async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IntakeReport>> {
    let mut files = Vec::new();
    let mut pending_modified = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "lastModified" => {
                let text = field.text().await?;
                let millis: i64 = text.trim().parse().map_err(|_| {
                    AppError::BadRequest(format!("Invalid lastModified value: {:?}", text))
                })?;
                pending_modified = DateTime::from_timestamp_millis(millis);
            }
            "file" | "files" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .or_else(|| {
                        mime_guess::from_path(&file_name)
                            .first_raw()
                            .map(|s| s.to_string())
                    })
                    .unwrap_or_default();
                let data = field.bytes().await?;

                tracing::debug!(
                    file_name = %file_name,
                    content_type = %content_type,
                    size = data.len(),
                    "Received file part"
                );

                let mut file = RawFile::new(file_name, content_type, data);
                if let Some(modified) = pending_modified.take() {
                    file = file.with_last_modified(modified);
                }
                files.push(file);
            }
            other => {
                tracing::debug!(field = %other, "Ignoring multipart field");
            }
        }
    }

    if files.is_empty() {
        tracing::warn!("No file field found in multipart upload");
        return Err(AppError::BadRequest(
            "No file provided. Use field name 'file' or 'files'".to_string(),
        ));
    }

    let report = state.organizer().intake_batch(files).await;
    tracing::info!(
        accepted = report.accepted.len(),
        rejected = report.rejected.len(),
        "Upload processed"
    );

    Ok(Json(report))
}

/// PUT /api/v1/files/order
async fn reorder_files(
    State(state): State<AppState>,
    Json(request): Json<OrderRequest>,
) -> Result<Json<FileListResponse>> {
    let files = state.organizer().reorder(&request.ids).await?;
    Ok(Json(files.into()))
}

/// GET /api/v1/files/:id
async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileMetadataView>> {
    let view = state.organizer().metadata(&FileId::from(id)).await?;
    Ok(Json(view))
}

/// DELETE /api/v1/files/:id
async fn delete_file(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    state.organizer().delete(&FileId::from(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/files/:id/content
async fn get_content(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let (name, data) = state.organizer().content(&FileId::from(id)).await?;
    pdf_response(data.into(), PDF_MIME_TYPE, &name, "inline")
}

/// POST /api/v1/files/:id/rotate
async fn rotate_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RotateRequest>,
) -> Result<Json<FileSummary>> {
    let summary = state
        .organizer()
        .rotate(&FileId::from(id), request.degrees)
        .await?;
    Ok(Json(summary))
}

/// POST /api/v1/files/:id/move
async fn move_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<MoveRequest>,
) -> Result<Json<FileListResponse>> {
    let files = state
        .organizer()
        .move_item(&FileId::from(id), request.to_index)
        .await?;
    Ok(Json(files.into()))
}

/// GET /api/v1/files/:id/extract?rotation=<deg>
///
/// Without `rotation`, the file's display rotation is applied.
async fn extract_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExtractQuery>,
) -> Result<Response> {
    let id = FileId::from(id);
    let organizer = state.organizer();
    let name = organizer.summary(&id).await?.name;
    let blob = organizer.extract(&id, query.rotation).await?;

    blob_response(blob, &name)
}

/// POST /api/v1/files/:id/merge
async fn merge_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<MergeRequest>,
) -> Result<Response> {
    let id = FileId::from(id);
    let organizer = state.organizer();
    let name = organizer.summary(&id).await?.name;
    let blob = organizer
        .merge(&id, &request.source_id, request.position)
        .await?;

    blob_response(blob, &name)
}

// ============================================================================
// Helpers
// ============================================================================

fn blob_response(blob: PdfBlob, name: &str) -> Result<Response> {
    pdf_response(blob.bytes.into(), blob.content_type, name, "attachment")
}

fn pdf_response(
    body: Body,
    content_type: &str,
    name: &str,
    disposition: &str,
) -> Result<Response> {
    let file_name = download_name(name);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("{}; filename=\"{}\"", disposition, file_name),
        )
        .header(header::CACHE_CONTROL, "no-store")
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

/// File name safe for a quoted Content-Disposition parameter
fn download_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();

    if cleaned.trim().is_empty() {
        "document.pdf".to_string()
    } else {
        cleaned
    }
}
