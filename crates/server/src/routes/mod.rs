//! HTTP route handlers for the docgate gateway.

pub mod convert;
pub mod docs;
pub mod files;
pub mod health;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::Router;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the shared API token, when one is configured.
pub const API_TOKEN_HEADER: &str = "x-api-token";

/// Create the combined router.
///
/// Routes:
/// - POST /convert - Submit a conversion job (multipart upload or JSON path)
/// - GET  /convert?jobId=<id> - Poll job status and result
/// - GET  /files/{year}/{partition}/{filename} - Download a produced artifact
/// - GET  /, /docs - Documentation page
/// - GET  /health - Health check
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(convert::router())
        .merge(files::router())
        .merge(docs::router())
        .merge(health::router())
        .with_state(state)
}

/// Enforce the shared API token when one is configured. Open endpoints
/// (docs, health) never call this.
pub(crate) fn require_token(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.config.api_token.as_deref() else {
        return Ok(());
    };
    match headers.get(API_TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
        Some(token) if token == expected => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}
