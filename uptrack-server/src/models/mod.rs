//! Data models for uptrack

pub mod upload_batch;

pub use upload_batch::{
    CompletionOutcome, FileEntry, FileError, UploadBatch, UploadId, UploadStatus,
};
