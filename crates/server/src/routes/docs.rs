// crates/server/src/routes/docs.rs
//! API documentation page.
//!
//! Served at `/` and `/docs` without authentication. When a custom page is
//! configured it is read per request so edits show up without a restart;
//! otherwise a built-in page describing the API is returned.

use std::sync::Arc;

use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};

use crate::state::AppState;

const FALLBACK_DOCS: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>docgate</title>
  <style>
    body { font-family: system-ui, sans-serif; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; }
    code { background: #f2f2f2; padding: 0.1rem 0.3rem; border-radius: 3px; }
    pre { background: #f2f2f2; padding: 0.75rem; border-radius: 4px; overflow-x: auto; }
  </style>
</head>
<body>
  <h1>docgate</h1>
  <p>Document conversion job service.</p>

  <h2>Submit a job</h2>
  <p>Upload a file:</p>
  <pre>curl -F "InputFile=@report.docx" http://localhost:5000/convert</pre>
  <p>Or reference a file already on the server:</p>
  <pre>curl -H "Content-Type: application/json" \
  -d '{"inputFile": "/srv/in/report.docx"}' \
  http://localhost:5000/convert</pre>
  <p>Both return <code>{"status": "queued", "jobId": "..."}</code>.</p>

  <h2>Poll for the result</h2>
  <pre>curl "http://localhost:5000/convert?jobId=&lt;id&gt;"</pre>
  <p>Status is one of <code>queued</code>, <code>running</code>,
  <code>completed</code>, <code>failed</code>. A completed job carries
  download links in <code>result</code>.</p>

  <h2>Download artifacts</h2>
  <pre>curl -O "http://localhost:5000/files/&lt;year&gt;/&lt;day&gt;/&lt;file&gt;"</pre>

  <p>When the service is started with an API token, requests to
  <code>/convert</code> and <code>/files</code> must carry it in the
  <code>X-Api-Token</code> header.</p>
</body>
</html>
"#;

/// GET / and /docs - Serve the documentation page.
pub async fn docs_page(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Some(page) = &state.config.docs_page {
        match tokio::fs::read_to_string(page).await {
            Ok(html) => return Html(html),
            Err(e) => {
                tracing::warn!(page = %page.display(), error = %e, "cannot read docs page, serving built-in");
            }
        }
    }
    Html(FALLBACK_DOCS.to_string())
}

/// Create the docs routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(docs_page))
        .route("/docs", get(docs_page))
}
