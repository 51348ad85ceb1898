// crates/server/src/routes/files.rs
//! Artifact downloads.
//!
//! Serves produced files from the partitioned output root only. Path
//! components are validated before resolution so a request can never
//! escape the root.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use docgate_core::storage::{content_type_for, sanitize_file_name};
use tokio_util::io::ReaderStream;

use crate::error::{ApiError, ApiResult};
use crate::routes::require_token;
use crate::state::AppState;

/// GET /files/{year}/{partition}/{filename} - Stream an artifact.
///
/// Content type is derived from the extension; the response always carries
/// an attachment disposition with the stored file name.
pub async fn download(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((year, partition, filename)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    require_token(&state, &headers)?;

    let reference = format!("{year}/{partition}/{filename}");
    let Some(path) = state.layout.resolve_artifact(&year, &partition, &filename) else {
        return Err(ApiError::ArtifactNotFound(reference));
    };

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::ArtifactNotFound(reference.clone()))?;
    let metadata = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(format!("cannot stat artifact: {e}")))?;
    if !metadata.is_file() {
        return Err(ApiError::ArtifactNotFound(reference));
    }

    let content_type = content_type_for(&filename);
    let disposition = format!(
        "attachment; filename=\"{}\"",
        sanitize_file_name(&filename)
    );
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, metadata.len().to_string()),
        ],
        body,
    )
        .into_response())
}

/// Create the files routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/files/{year}/{partition}/{filename}", get(download))
}
