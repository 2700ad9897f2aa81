//! Upload batch API handlers
//!
//! POST /uploads, GET /uploads/:upload_id, POST /uploads/:upload_id/files/complete,
//! POST /uploads/:upload_id/upload, POST /uploads/:upload_id/cancel

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    api::{sse::upload_event_stream, ws::upload_websocket},
    error::{ApiError, ApiResult},
    models::{UploadBatch, UploadId, UploadStatus},
    tracker::CompletionReceipt,
    AppState,
};

/// POST /uploads request
#[derive(Debug, Deserialize)]
pub struct CreateUploadRequest {
    pub content_type: String,
    pub file_paths: Vec<String>,
}

/// POST /uploads/:upload_id/files/complete request
#[derive(Debug, Deserialize)]
pub struct CompleteFileRequest {
    pub file_path: String,
}

/// Query string of POST /uploads/report
#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub upload_id: String,
}

/// POST /uploads/:upload_id/upload response
#[derive(Debug, Serialize)]
pub struct UploadFilesResponse {
    pub filenames: Vec<String>,
    pub status: UploadStatus,
}

/// POST /uploads
///
/// Declare a batch. Returns 201 Created with the new batch. A batch with no
/// valid file is still created (as canceled) and reported as a 400 carrying
/// the batch. Malformed bodies are a 400 `BAD_REQUEST`.
pub async fn start_upload(
    State(state): State<AppState>,
    payload: Result<Json<CreateUploadRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UploadBatch>)> {
    let Json(request) = payload?;
    let batch = state
        .tracker
        .create_batch(&request.content_type, request.file_paths)
        .await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

/// GET /uploads/:upload_id
pub async fn get_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<UploadBatch>> {
    let batch = state.tracker.get_report(&UploadId::from(upload_id)).await?;
    Ok(Json(batch))
}

/// POST /uploads/report?upload_id=...
pub async fn report_upload(
    State(state): State<AppState>,
    query: Result<Query<ReportQuery>, QueryRejection>,
) -> ApiResult<Json<UploadBatch>> {
    let Query(query) = query?;
    let batch = state
        .tracker
        .get_report(&UploadId::from(query.upload_id))
        .await?;
    Ok(Json(batch))
}

/// POST /uploads/:upload_id/files/complete
pub async fn complete_file(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    payload: Result<Json<CompleteFileRequest>, JsonRejection>,
) -> ApiResult<Json<CompletionReceipt>> {
    let Json(request) = payload?;
    let receipt = state
        .tracker
        .record_file_completion(&UploadId::from(upload_id), &request.file_path)
        .await?;
    Ok(Json(receipt))
}

/// POST /uploads/:upload_id/upload
///
/// Multipart body, one part per asset. Every part that carries a file name
/// is drained and recorded as a completion under that name; other parts are
/// skipped.
pub async fn upload_files(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadFilesResponse>> {
    let id = UploadId::from(upload_id);

    // Unknown ids fail before any body is read
    let mut status = state.tracker.get_report(&id).await?.status;
    let mut multipart = multipart?;
    let mut filenames = Vec::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            debug!(upload_id = %id, part = ?field.name(), "Skipping part without file name");
            continue;
        };

        let mut bytes = 0usize;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
        {
            bytes += chunk.len();
        }
        debug!(upload_id = %id, file_name = %file_name, bytes, "Received file part");

        let receipt = state.tracker.record_file_completion(&id, &file_name).await?;
        status = receipt.status;
        filenames.push(file_name);
    }

    info!(upload_id = %id, files = filenames.len(), status = %status, "Multipart upload processed");
    Ok(Json(UploadFilesResponse { filenames, status }))
}

/// POST /uploads/:upload_id/cancel
pub async fn cancel_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<UploadBatch>> {
    let batch = state.tracker.cancel(&UploadId::from(upload_id)).await?;
    Ok(Json(batch))
}

/// Build upload routes, including both subscription transports
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/uploads", post(start_upload))
        .route("/uploads/report", post(report_upload))
        .route("/uploads/:upload_id", get(get_upload))
        .route("/uploads/:upload_id/files/complete", post(complete_file))
        .route("/uploads/:upload_id/upload", post(upload_files))
        .route("/uploads/:upload_id/cancel", post(cancel_upload))
        .route("/uploads/:upload_id/sse", get(upload_event_stream))
        .route("/uploads/:upload_id/ws", get(upload_websocket))
}
