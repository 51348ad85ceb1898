// crates/core/src/config.rs
//! Service configuration.
//!
//! Constructed by the caller (CLI or tests) and handed to the service whole.
//! There is no ambient/global configuration; a new `ServiceConfig` is built
//! for every run.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default port the HTTP gateway listens on.
pub const DEFAULT_PORT: u16 = 5000;

/// Default retention horizon for partition auto-deletion, in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Default wall-clock bound on a single conversion.
pub const DEFAULT_CONVERSION_TIMEOUT: Duration = Duration::from_secs(600);

/// Configuration for one service run.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Port the HTTP gateway listens on.
    pub port: u16,
    /// Root directory for all job storage (uploads and outputs live under it).
    pub task_root: PathBuf,
    /// Refresh computed fields and tables-of-contents before saving.
    pub enable_refresh: bool,
    /// Export a PDF rendition in addition to the normalized docx.
    pub enable_pdf: bool,
    /// Sweep old upload partitions at startup.
    pub auto_delete_uploads: bool,
    /// Sweep old output partitions at startup.
    pub auto_delete_outputs: bool,
    /// Partitions strictly older than this many days are swept.
    pub retention_days: u32,
    /// Shared API token; when set, `/convert` and `/files` require it.
    pub api_token: Option<String>,
    /// Wall-clock bound on a single conversion. `None` disables the bound,
    /// accepting that a stuck conversion stalls the queue.
    pub conversion_timeout: Option<Duration>,
    /// When set, terminal ledger entries older than this are evicted.
    /// Disabled by default to keep terminal results pollable for the
    /// lifetime of the process.
    pub ledger_ttl: Option<Duration>,
    /// Optional HTML file served at `/` and `/docs` instead of the built-in
    /// fallback page.
    pub docs_page: Option<PathBuf>,
}

impl ServiceConfig {
    /// Create a configuration with defaults matching the production service:
    /// refresh and PDF export on, auto-deletion off, 7-day retention, 10
    /// minute conversion timeout, no token, no ledger eviction.
    pub fn new(task_root: impl Into<PathBuf>) -> Self {
        Self {
            port: DEFAULT_PORT,
            task_root: task_root.into(),
            enable_refresh: true,
            enable_pdf: true,
            auto_delete_uploads: false,
            auto_delete_outputs: false,
            retention_days: DEFAULT_RETENTION_DAYS,
            api_token: None,
            conversion_timeout: Some(DEFAULT_CONVERSION_TIMEOUT),
            ledger_ttl: None,
            docs_page: None,
        }
    }

    /// Root for uploaded inputs: `<taskRoot>/uploads`.
    pub fn upload_root(&self) -> PathBuf {
        self.task_root.join("uploads")
    }

    /// Root for produced artifacts: `<taskRoot>/outputs`.
    pub fn output_root(&self) -> PathBuf {
        self.task_root.join("outputs")
    }

    /// The task root directory.
    pub fn task_root(&self) -> &Path {
        &self.task_root
    }
}
