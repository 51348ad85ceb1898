// crates/server/src/routes/convert.rs
//! Job submission and status polling.
//!
//! Submission is fire-and-forget: the upload is persisted synchronously,
//! the job is enqueued, and the handler returns without waiting on the
//! worker. Outcomes are discovered by polling `GET /convert?jobId=`.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{FromRequest, Multipart, Query, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    routing::post,
    Json, Router,
};
use docgate_core::storage::PartitionKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::jobs::{Job, JobId, JobResult, JobStatus};
use crate::routes::require_token;
use crate::state::AppState;

/// Upper bound on a JSON submission body. File uploads go through
/// multipart and are not subject to this.
const MAX_JSON_BODY: usize = 64 * 1024;

/// Multipart field carrying the uploaded document.
const UPLOAD_FIELD: &str = "InputFile";

/// JSON submission body: reference to an existing file on disk.
#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct SubmitRequest {
    pub input_file: Option<PathBuf>,
}

/// Response to a successful submission.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub status: String,
    pub job_id: JobId,
}

/// Status query parameters.
#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct StatusQuery {
    pub job_id: Option<String>,
}

/// Response to a status poll.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

/// POST /convert - Submit a conversion job.
///
/// Accepts either `multipart/form-data` with a file field or a JSON body
/// `{"inputFile": "/path/to/doc"}`. Responds `{status: "queued", jobId}`.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> ApiResult<Json<SubmitResponse>> {
    require_token(&state, request.headers())?;

    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?;
        submit_upload(&state, multipart).await
    } else {
        let bytes = axum::body::to_bytes(request.into_body(), MAX_JSON_BODY)
            .await
            .map_err(|e| ApiError::BadRequest(format!("unreadable request body: {e}")))?;
        let body: SubmitRequest = serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))?;
        submit_path(&state, body).await
    }
}

/// Multipart branch: read the `InputFile` field, persist its bytes under
/// the partitioned upload root, then enqueue. Other fields are ignored.
async fn submit_upload(
    state: &AppState,
    mut multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart field: {e}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let Some(original_name) = field.file_name().map(str::to_owned) else {
            return Err(ApiError::BadRequest(format!(
                "{UPLOAD_FIELD} field carries no filename"
            )));
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
        if data.is_empty() {
            return Err(ApiError::BadRequest("uploaded file is empty".to_string()));
        }

        let job_id = Uuid::new_v4().to_string();
        let key = PartitionKey::today();
        let upload_path = state.layout.upload_path(&key, &job_id, &original_name);
        if let Some(parent) = upload_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ApiError::Internal(format!("cannot create upload dir: {e}")))?;
        }
        tokio::fs::write(&upload_path, &data)
            .await
            .map_err(|e| ApiError::Internal(format!("cannot persist upload: {e}")))?;

        tracing::info!(
            job_id = %job_id,
            original = %original_name,
            bytes = data.len(),
            upload = %upload_path.display(),
            "upload persisted"
        );
        return Ok(Json(enqueue(state, job_id, key, upload_path, original_name)));
    }

    Err(ApiError::BadRequest(format!(
        "multipart request contained no {UPLOAD_FIELD} field"
    )))
}

/// JSON branch: validate the referenced path, then enqueue.
async fn submit_path(state: &AppState, body: SubmitRequest) -> ApiResult<Json<SubmitResponse>> {
    let Some(input) = body.input_file.filter(|p| !p.as_os_str().is_empty()) else {
        return Err(ApiError::BadRequest("inputFile is required".to_string()));
    };
    let exists = tokio::fs::try_exists(&input).await.unwrap_or(false);
    if !exists {
        return Err(ApiError::BadRequest(format!(
            "inputFile does not exist: {}",
            input.display()
        )));
    }

    let original_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let job_id = Uuid::new_v4().to_string();
    let key = PartitionKey::today();
    Ok(Json(enqueue(state, job_id, key, input, original_name)))
}

/// Build the job, record it as queued, and hand it to the worker. The
/// ledger entry is written before the enqueue so the worker always finds it.
fn enqueue(
    state: &AppState,
    job_id: JobId,
    key: PartitionKey,
    input_path: PathBuf,
    original_name: String,
) -> SubmitResponse {
    let job = Job {
        docx_path: state.layout.output_path(&key, &job_id, "docx"),
        pdf_path: state
            .config
            .enable_pdf
            .then(|| state.layout.output_path(&key, &job_id, "pdf")),
        id: job_id.clone(),
        input_path,
        partition: key,
        original_name,
    };

    state.ledger.insert_queued(&job.id);
    state.queue.enqueue(job);
    tracing::info!(job_id = %job_id, queued = state.queue.len(), "job queued");

    SubmitResponse {
        status: "queued".to_string(),
        job_id,
    }
}

/// GET /convert?jobId=<id> - Poll job status.
pub async fn status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<StatusResponse>> {
    require_token(&state, &headers)?;

    let Some(job_id) = query.job_id.filter(|id| !id.is_empty()) else {
        return Err(ApiError::BadRequest(
            "missing jobId query parameter".to_string(),
        ));
    };
    let Some((status, result)) = state.ledger.snapshot(&job_id) else {
        return Err(ApiError::JobNotFound(job_id));
    };
    Ok(Json(StatusResponse {
        job_id,
        status,
        result,
    }))
}

/// Create the convert routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/convert", post(submit).get(status))
}
