// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Structured JSON error response for API errors.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes.
///
/// Validation and not-found errors are resolved synchronously in the
/// gateway; conversion failures never appear here — they surface through
/// the ledger's `failed` status instead.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
            ApiError::JobNotFound(id) => {
                tracing::warn!(job_id = %id, "job not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Job not found", format!("Job ID: {id}")),
                )
            }
            ApiError::ArtifactNotFound(path) => {
                tracing::warn!(artifact = %path, "artifact not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::new("Artifact not found"),
                )
            }
            ApiError::Unauthorized => {
                tracing::warn!("rejected request with missing or invalid API token");
                (StatusCode::UNAUTHORIZED, ErrorResponse::new("Unauthorized"))
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "internal server error");
                // Internal details stay out of client responses.
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
