//! In-memory upload store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{BatchStore, StoreResult};
use crate::models::{UploadBatch, UploadId};

/// Process-local store backed by a map
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    batches: Arc<RwLock<HashMap<UploadId, UploadBatch>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored batches
    pub async fn len(&self) -> usize {
        self.batches.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.batches.read().await.is_empty()
    }
}

#[async_trait]
impl BatchStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn upsert(&self, id: &UploadId, batch: &UploadBatch) -> StoreResult<()> {
        self.batches.write().await.insert(id.clone(), batch.clone());
        Ok(())
    }

    async fn find(&self, id: &UploadId) -> StoreResult<Option<UploadBatch>> {
        Ok(self.batches.read().await.get(id).cloned())
    }
}
