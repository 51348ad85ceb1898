// crates/core/src/storage.rs
//! Date-partitioned storage layout.
//!
//! Every artifact, uploaded or produced, lives under
//! `<root>/<yyyy>/<MMdd>/<file>`. The partition key is taken from the
//! submission instant and is used both for client-facing download URLs and
//! as the retention-sweep granularity: a whole day directory is deleted or
//! kept atomically.

use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, NaiveDate};

/// A `<yyyy>/<MMdd>` partition identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionKey {
    pub year: String,
    pub day: String,
}

impl PartitionKey {
    /// Partition for a calendar date.
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            year: format!("{:04}", date.year()),
            day: format!("{:02}{:02}", date.month(), date.day()),
        }
    }

    /// Partition for the current local date. Submission instants key the
    /// layout, so this is what the gateway uses.
    pub fn today() -> Self {
        Self::for_date(Local::now().date_naive())
    }

    /// Parse a `(year, day)` directory-name pair back into a date.
    /// Returns `None` for names that are not `yyyy` / `MMdd`.
    pub fn parse(year: &str, day: &str) -> Option<NaiveDate> {
        // Directory names come straight off disk; only all-digit names may
        // be sliced below.
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if year.len() != 4 || day.len() != 4 || !all_digits(year) || !all_digits(day) {
            return None;
        }
        let y: i32 = year.parse().ok()?;
        let m: u32 = day[..2].parse().ok()?;
        let d: u32 = day[2..].parse().ok()?;
        NaiveDate::from_ymd_opt(y, m, d)
    }
}

/// Resolved upload and output roots for one service run.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    upload_root: PathBuf,
    output_root: PathBuf,
}

impl StorageLayout {
    pub fn new(upload_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            upload_root: upload_root.into(),
            output_root: output_root.into(),
        }
    }

    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Where an uploaded input is persisted:
    /// `<uploads>/<yyyy>/<MMdd>/<jobId>_<sanitizedName>`.
    pub fn upload_path(&self, key: &PartitionKey, job_id: &str, original_name: &str) -> PathBuf {
        self.upload_root
            .join(&key.year)
            .join(&key.day)
            .join(format!("{job_id}_{}", sanitize_file_name(original_name)))
    }

    /// Where a produced artifact lands:
    /// `<outputs>/<yyyy>/<MMdd>/<jobId>.<ext>`.
    pub fn output_path(&self, key: &PartitionKey, job_id: &str, ext: &str) -> PathBuf {
        self.output_root
            .join(&key.year)
            .join(&key.day)
            .join(format!("{job_id}.{ext}"))
    }

    /// Resolve a download request to a path under the output root.
    ///
    /// Returns `None` when any component would escape the root; existence is
    /// the caller's concern.
    pub fn resolve_artifact(&self, year: &str, day: &str, file_name: &str) -> Option<PathBuf> {
        if ![year, day, file_name].iter().all(|p| is_safe_component(p)) {
            return None;
        }
        Some(self.output_root.join(year).join(day).join(file_name))
    }
}

fn is_safe_component(part: &str) -> bool {
    !part.is_empty() && part != "." && part != ".." && !part.contains(['/', '\\', '\0'])
}

/// Client-facing reference for a produced artifact.
pub fn artifact_href(key: &PartitionKey, file_name: &str) -> String {
    format!("/files/{}/{}/{}", key.year, key.day, file_name)
}

/// Reduce an uploaded file name to something safe to persist next to other
/// jobs. Keeps letters, digits, `.`, `-` and `_`; everything else becomes
/// `_`. Leading/trailing dots are stripped so the result can never be a
/// dotfile or a traversal component.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Content type for a served artifact, derived from its extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        _ => "application/octet-stream",
    }
}
