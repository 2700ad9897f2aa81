//! Error types for uptrack-server
//!
//! [`TrackerError`] is the domain taxonomy returned by the tracker and the
//! notifier. [`ApiError`] maps it onto HTTP responses.

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::{UploadBatch, UploadId};
use crate::store::StoreError;
use crate::validation::InvalidCategory;

/// Upload tracking failure
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Request rejected before anything was persisted
    #[error("Validation error: {0}")]
    Validation(String),

    /// Every declared file failed validation; the canceled batch was persisted
    #[error("No valid file in upload {}", .0.upload_id)]
    NoValidFiles(Box<UploadBatch>),

    /// Unknown upload id
    #[error("Upload not found: {0}")]
    NotFound(UploadId),

    /// Backing store failed (never reported as NotFound)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Snapshot delivery to a subscriber failed
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<InvalidCategory> for TrackerError {
    fn from(err: InvalidCategory) -> Self {
        TrackerError::Validation(err.to_string())
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Domain error from the tracker
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// Invalid request (400) outside the tracker's own validation
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, error_code, data) = match self {
            ApiError::Tracker(TrackerError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", None)
            }
            ApiError::Tracker(TrackerError::NoValidFiles(batch)) => (
                StatusCode::BAD_REQUEST,
                "NO_VALID_FILES",
                Some(serde_json::to_value(&*batch).unwrap_or_default()),
            ),
            ApiError::Tracker(TrackerError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", None)
            }
            ApiError::Tracker(TrackerError::StoreUnavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", None)
            }
            ApiError::Tracker(TrackerError::Transport(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "TRANSPORT_ERROR", None)
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", None),
        };

        let mut error = json!({
            "code": error_code,
            "message": message,
        });
        if let Some(data) = data {
            error["data"] = data;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
