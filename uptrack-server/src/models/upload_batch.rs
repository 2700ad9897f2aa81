//! Upload batch state machine
//!
//! A batch moves through three states:
//! IN_PROGRESS → COMPLETED, or IN_PROGRESS → CANCELED.
//! Both COMPLETED and CANCELED are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::validation::{self, ContentCategory};

/// Opaque batch identifier
///
/// Generated from a random UUID at creation. Lookups accept any string so an
/// unknown identifier is reported as not found rather than malformed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    /// Fresh identifier, never handed out twice
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UploadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for UploadId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Overall batch status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Accepting completion events
    InProgress,
    /// Every valid file has been uploaded
    Completed,
    /// No valid files at creation, or canceled by the client
    Canceled,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::InProgress => "in_progress",
            UploadStatus::Completed => "completed",
            UploadStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Canceled)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(UploadStatus::InProgress),
            "completed" => Ok(UploadStatus::Completed),
            "canceled" => Ok(UploadStatus::Canceled),
            other => Err(format!("unknown upload status: {}", other)),
        }
    }
}

/// Error tag attached to a file at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileError {
    /// Extension not accepted for the batch category
    InvalidFile,
}

/// One declared file of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub file_path: String,
    #[serde(default)]
    pub completed: bool,
    /// Empty if the path passed validation; fixed at creation
    #[serde(default)]
    pub errors: BTreeSet<FileError>,
}

impl FileEntry {
    fn validated(category: ContentCategory, file_path: String) -> Self {
        let mut errors = BTreeSet::new();
        if !validation::is_valid_for(category, &file_path) {
            errors.insert(FileError::InvalidFile);
        }
        Self {
            file_path,
            completed: false,
            errors,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Result of applying one completion event to a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// File newly marked completed; batch must be persisted
    Recorded,
    /// File was already completed
    AlreadyCompleted,
    /// No file with this path in the batch
    UnknownPath,
    /// Batch is completed or canceled
    Terminal,
}

/// Upload batch (aggregate root)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadBatch {
    pub upload_id: UploadId,
    pub content_type: ContentCategory,
    pub files: Vec<FileEntry>,
    pub status: UploadStatus,
    pub created_at: DateTime<Utc>,
    /// Set when the batch reaches a terminal status
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl UploadBatch {
    /// Build a validated batch with a fresh identifier
    ///
    /// Files keep the order of `file_paths`. A batch without any valid file
    /// starts out canceled.
    pub fn new(content_type: ContentCategory, file_paths: Vec<String>) -> Self {
        let files: Vec<FileEntry> = file_paths
            .into_iter()
            .map(|path| FileEntry::validated(content_type, path))
            .collect();

        let now = Utc::now();
        let mut batch = Self {
            upload_id: UploadId::generate(),
            content_type,
            files,
            status: UploadStatus::InProgress,
            created_at: now,
            ended_at: None,
        };

        if !batch.has_valid_files() {
            batch.transition_to(UploadStatus::Canceled);
        }
        batch
    }

    /// At least one file passed validation
    pub fn has_valid_files(&self) -> bool {
        self.files.iter().any(FileEntry::is_valid)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to a terminal status
    ///
    /// Only `in_progress` batches move; returns false when the batch was
    /// already terminal or `new_status` is `in_progress`.
    pub fn transition_to(&mut self, new_status: UploadStatus) -> bool {
        if self.is_terminal() || !new_status.is_terminal() {
            return false;
        }
        self.status = new_status;
        self.ended_at = Some(Utc::now());
        true
    }

    /// Every file that passed validation has been completed
    pub fn all_valid_files_completed(&self) -> bool {
        self.files
            .iter()
            .filter(|file| file.is_valid())
            .all(|file| file.completed)
    }

    pub fn valid_file_count(&self) -> usize {
        self.files.iter().filter(|file| file.is_valid()).count()
    }

    pub fn completed_file_count(&self) -> usize {
        self.files
            .iter()
            .filter(|file| file.is_valid() && file.completed)
            .count()
    }

    /// Apply a completion event for `file_path`
    ///
    /// Marks the matching file and completes the batch once every valid file
    /// is done. Terminal batches and unknown paths are left untouched.
    pub fn record_completion(&mut self, file_path: &str) -> CompletionOutcome {
        if self.is_terminal() {
            return CompletionOutcome::Terminal;
        }

        let Some(file) = self.files.iter_mut().find(|f| f.file_path == file_path) else {
            return CompletionOutcome::UnknownPath;
        };

        if file.completed {
            return CompletionOutcome::AlreadyCompleted;
        }
        file.completed = true;

        if self.all_valid_files_completed() {
            self.transition_to(UploadStatus::Completed);
        }
        CompletionOutcome::Recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_batch_validates_in_order() {
        let batch = UploadBatch::new(ContentCategory::Images, paths(&["a.jpg", "b.txt"]));

        assert_eq!(batch.status, UploadStatus::InProgress);
        assert_eq!(batch.files.len(), 2);
        assert_eq!(batch.files[0].file_path, "a.jpg");
        assert!(batch.files[0].errors.is_empty());
        assert_eq!(batch.files[1].file_path, "b.txt");
        assert!(batch.files[1].errors.contains(&FileError::InvalidFile));
        assert!(batch.ended_at.is_none());
    }

    #[test]
    fn test_new_batch_without_valid_files_is_canceled() {
        let batch = UploadBatch::new(ContentCategory::Images, paths(&["b.txt"]));
        assert_eq!(batch.status, UploadStatus::Canceled);
        assert!(batch.ended_at.is_some());

        let empty = UploadBatch::new(ContentCategory::Audios, Vec::new());
        assert_eq!(empty.status, UploadStatus::Canceled);
    }

    #[test]
    fn test_identifiers_are_unique() {
        let a = UploadBatch::new(ContentCategory::SpecialContent, paths(&["x"]));
        let b = UploadBatch::new(ContentCategory::SpecialContent, paths(&["x"]));
        assert_ne!(a.upload_id, b.upload_id);
    }

    #[test]
    fn test_completion_converges() {
        let mut batch =
            UploadBatch::new(ContentCategory::Images, paths(&["a.jpg", "b.png", "c.txt"]));

        assert_eq!(batch.record_completion("b.png"), CompletionOutcome::Recorded);
        assert_eq!(batch.status, UploadStatus::InProgress);
        assert_eq!(batch.record_completion("a.jpg"), CompletionOutcome::Recorded);
        // c.txt failed validation and is not waited for
        assert_eq!(batch.status, UploadStatus::Completed);
        assert!(batch.ended_at.is_some());
    }

    #[test]
    fn test_completion_is_idempotent() {
        let mut batch = UploadBatch::new(ContentCategory::Images, paths(&["a.jpg", "b.jpg"]));

        assert_eq!(batch.record_completion("a.jpg"), CompletionOutcome::Recorded);
        let after_first = batch.clone();
        assert_eq!(
            batch.record_completion("a.jpg"),
            CompletionOutcome::AlreadyCompleted
        );
        assert_eq!(batch, after_first);
    }

    #[test]
    fn test_unknown_path_is_ignored() {
        let mut batch = UploadBatch::new(ContentCategory::Images, paths(&["a.jpg"]));
        let before = batch.clone();
        assert_eq!(
            batch.record_completion("missing.jpg"),
            CompletionOutcome::UnknownPath
        );
        assert_eq!(batch, before);
    }

    #[test]
    fn test_terminal_batches_do_not_move() {
        let mut canceled = UploadBatch::new(ContentCategory::Images, paths(&["b.txt"]));
        assert_eq!(canceled.record_completion("b.txt"), CompletionOutcome::Terminal);
        assert!(!canceled.files[0].completed);
        assert!(!canceled.transition_to(UploadStatus::Completed));
        assert_eq!(canceled.status, UploadStatus::Canceled);

        let mut done = UploadBatch::new(ContentCategory::Images, paths(&["a.jpg"]));
        done.record_completion("a.jpg");
        assert!(!done.transition_to(UploadStatus::Canceled));
        assert_eq!(done.status, UploadStatus::Completed);
    }

    #[test]
    fn test_transition_back_to_in_progress_rejected() {
        let mut batch = UploadBatch::new(ContentCategory::Images, paths(&["a.jpg"]));
        assert!(!batch.transition_to(UploadStatus::InProgress));
        assert!(batch.ended_at.is_none());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let batch = UploadBatch::new(ContentCategory::Images, paths(&["a.jpg", "b.txt"]));
        let json = serde_json::to_value(&batch).unwrap();

        assert_eq!(json["upload_id"], batch.upload_id.as_str());
        assert_eq!(json["content_type"], "images");
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["files"][0]["file_path"], "a.jpg");
        assert_eq!(json["files"][0]["completed"], false);
        assert_eq!(json["files"][0]["errors"], serde_json::json!([]));
        assert_eq!(json["files"][1]["errors"], serde_json::json!(["invalid_file"]));
    }

    #[test]
    fn test_status_parse() {
        for status in [
            UploadStatus::InProgress,
            UploadStatus::Completed,
            UploadStatus::Canceled,
        ] {
            assert_eq!(status.as_str().parse::<UploadStatus>(), Ok(status));
        }
        assert!("cancelled".parse::<UploadStatus>().is_err());
    }
}
