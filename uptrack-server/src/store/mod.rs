//! Upload record storage
//!
//! The store owns the durable copy of every batch. Callers only upsert whole
//! batches and look them up by id; serialising read-modify-write sequences is
//! the tracker's job.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uptrack_common::config::{StoreBackend, StoreConfig};

use crate::models::{UploadBatch, UploadId};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Store failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Batch could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored row does not describe a valid batch
    #[error("Corrupt record {upload_id}: {reason}")]
    Corrupt { upload_id: String, reason: String },

    /// Backend cannot be reached (closed pool, acquire timeout, I/O failure)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed storage for upload batches
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;

    /// Insert or replace the batch stored under `id`
    async fn upsert(&self, id: &UploadId, batch: &UploadBatch) -> StoreResult<()>;

    /// Point lookup by id
    async fn find(&self, id: &UploadId) -> StoreResult<Option<UploadBatch>>;
}

/// Open the store selected by configuration
pub async fn open_store(config: &StoreConfig) -> StoreResult<Arc<dyn BatchStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory upload store (records are lost on restart)");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sqlite => {
            let store = SqliteStore::connect(&config.database_path).await?;
            info!("Using SQLite upload store: {}", config.database_path.display());
            Ok(Arc::new(store))
        }
    }
}
