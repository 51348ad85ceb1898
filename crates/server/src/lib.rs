// crates/server/src/lib.rs
//! docgate HTTP server library.
//!
//! Exposes the application factory for integration testing and the
//! service lifecycle used by the binary.

pub mod error;
pub mod jobs;
pub mod routes;
pub mod service;
pub mod state;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the Axum application with all routes and middleware.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::api_routes(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
