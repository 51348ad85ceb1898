// crates/server/src/jobs/types.rs
//! Types for the conversion job system.

use std::collections::BTreeMap;
use std::path::PathBuf;

use docgate_core::storage::PartitionKey;
use serde::Serialize;

/// Unique job identifier, assigned at submission. Never client-supplied.
pub type JobId = String;

/// Lifecycle status of a job.
///
/// Monotonic per job: queued → running → {completed | failed}, exactly once.
/// An unknown id is "not found", distinct from all four states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Kind of produced artifact, keyed in job results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Docx,
    Pdf,
}

/// Map from artifact kind to its client-facing download href.
pub type ArtifactMap = BTreeMap<ArtifactKind, String>;

/// Terminal outcome of a job, written once by the worker.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JobResult {
    /// Completed: produced artifacts by kind.
    Artifacts(ArtifactMap),
    /// Failed: the error description.
    Error { error: String },
}

/// One conversion request.
///
/// Created by the HTTP gateway, exclusively consumed by the worker. Output
/// paths are allocated at submission so results and download hrefs agree.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    /// Absolute input path; exists at enqueue time.
    pub input_path: PathBuf,
    /// Primary output: normalized docx copy.
    pub docx_path: PathBuf,
    /// Secondary output: fixed-format rendition, when export is enabled.
    pub pdf_path: Option<PathBuf>,
    /// Submission-instant partition, shared by outputs and download hrefs.
    pub partition: PartitionKey,
    /// Original upload name, kept for logging.
    pub original_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobStatus::Queued).unwrap(), "\"queued\"");
        assert_eq!(serde_json::to_string(&JobStatus::Running).unwrap(), "\"running\"");
        assert_eq!(serde_json::to_string(&JobStatus::Completed).unwrap(), "\"completed\"");
        assert_eq!(serde_json::to_string(&JobStatus::Failed).unwrap(), "\"failed\"");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_result_serialization_shapes() {
        let mut artifacts = ArtifactMap::new();
        artifacts.insert(ArtifactKind::Docx, "/files/2026/0827/a.docx".to_string());
        artifacts.insert(ArtifactKind::Pdf, "/files/2026/0827/a.pdf".to_string());
        let json = serde_json::to_string(&JobResult::Artifacts(artifacts)).unwrap();
        assert_eq!(
            json,
            "{\"docx\":\"/files/2026/0827/a.docx\",\"pdf\":\"/files/2026/0827/a.pdf\"}"
        );

        let json = serde_json::to_string(&JobResult::Error {
            error: "engine went away".to_string(),
        })
        .unwrap();
        assert_eq!(json, "{\"error\":\"engine went away\"}");
    }
}
