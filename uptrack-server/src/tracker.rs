//! Upload tracker
//!
//! Creates batches, records per-file completions and cancels batches. The
//! tracker keeps no batch state of its own: every operation reads from and
//! writes to the [`BatchStore`]. Read-modify-write sequences on one batch run
//! under a per-id lock so concurrent completions never overwrite each other.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::error::{TrackerError, TrackerResult};
use crate::models::{CompletionOutcome, UploadBatch, UploadId, UploadStatus};
use crate::store::BatchStore;
use crate::validation::ContentCategory;

/// Acknowledgement of a completion event
#[derive(Debug, Clone, Serialize)]
pub struct CompletionReceipt {
    pub upload_id: UploadId,
    pub file_path: String,
    pub outcome: CompletionOutcome,
    /// Batch status after the event was applied
    pub status: UploadStatus,
}

type LockTable = HashMap<UploadId, Arc<tokio::sync::Mutex<()>>>;

/// Per-batch async locks
///
/// Entries are created on demand and dropped once the last holder releases,
/// so the table only holds ids with an operation in flight. A waiter that is
/// cancelled after the holder released leaves an entry nobody references;
/// such entries are pruned on the next acquire.
#[derive(Debug, Clone, Default)]
struct BatchLocks {
    table: Arc<Mutex<LockTable>>,
}

struct BatchGuard {
    id: UploadId,
    table: Arc<Mutex<LockTable>>,
    _guard: OwnedMutexGuard<()>,
}

impl BatchLocks {
    async fn acquire(&self, id: &UploadId) -> BatchGuard {
        let mutex = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            // Only the table references these; every clone is taken under this lock
            table.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            table.entry(id.clone()).or_default().clone()
        };
        let guard = mutex.lock_owned().await;
        BatchGuard {
            id: id.clone(),
            table: self.table.clone(),
            _guard: guard,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        // Two references left (table entry + our guard) means nobody is waiting
        if let Some(mutex) = table.get(&self.id) {
            if Arc::strong_count(mutex) <= 2 {
                table.remove(&self.id);
            }
        }
    }
}

/// Upload batch state machine over an injected store
#[derive(Clone)]
pub struct UploadTracker {
    store: Arc<dyn BatchStore>,
    locks: BatchLocks,
}

impl std::fmt::Debug for UploadTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadTracker")
            .field("store", &self.store.backend_name())
            .finish()
    }
}

impl UploadTracker {
    pub fn new(store: Arc<dyn BatchStore>) -> Self {
        Self {
            store,
            locks: BatchLocks::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn BatchStore> {
        &self.store
    }

    /// Declare a new batch
    ///
    /// Fails with `Validation` (nothing persisted) when the category is
    /// unknown, a path is empty or a path appears twice. Otherwise the batch
    /// is persisted exactly once; when no file passes validation it is stored
    /// as canceled and returned inside `NoValidFiles`.
    pub async fn create_batch(
        &self,
        content_type: &str,
        file_paths: Vec<String>,
    ) -> TrackerResult<UploadBatch> {
        let category = content_type.parse::<ContentCategory>().map_err(|e| {
            warn!("{}", e);
            TrackerError::from(e)
        })?;
        check_paths(&file_paths)?;

        let batch = UploadBatch::new(category, file_paths);
        self.store.upsert(&batch.upload_id, &batch).await?;

        if batch.status == UploadStatus::Canceled {
            warn!(
                upload_id = %batch.upload_id,
                content_type = %category,
                files = batch.files.len(),
                "Upload canceled: no valid file"
            );
            return Err(TrackerError::NoValidFiles(Box::new(batch)));
        }

        info!(
            upload_id = %batch.upload_id,
            content_type = %category,
            files = batch.files.len(),
            valid_files = batch.valid_file_count(),
            "Starting upload"
        );
        Ok(batch)
    }

    /// Current state of a batch
    pub async fn get_report(&self, id: &UploadId) -> TrackerResult<UploadBatch> {
        self.store
            .find(id)
            .await?
            .ok_or_else(|| TrackerError::NotFound(id.clone()))
    }

    /// Mark one file of a batch as uploaded
    ///
    /// Completions for terminal batches, unknown paths and already completed
    /// files are acknowledged without writing to the store.
    pub async fn record_file_completion(
        &self,
        id: &UploadId,
        file_path: &str,
    ) -> TrackerResult<CompletionReceipt> {
        let _guard = self.locks.acquire(id).await;

        let mut batch = self.get_report(id).await?;
        let outcome = batch.record_completion(file_path);

        match outcome {
            CompletionOutcome::Recorded => {
                self.store.upsert(id, &batch).await?;
                debug!(upload_id = %id, file_path, "File upload recorded");
                if batch.status == UploadStatus::Completed {
                    info!(
                        upload_id = %id,
                        files = batch.completed_file_count(),
                        "Upload completed"
                    );
                }
            }
            CompletionOutcome::AlreadyCompleted => {
                debug!(upload_id = %id, file_path, "File already completed");
            }
            CompletionOutcome::UnknownPath => {
                debug!(upload_id = %id, file_path, "Ignoring completion for unknown file");
            }
            CompletionOutcome::Terminal => {
                debug!(
                    upload_id = %id,
                    file_path,
                    status = %batch.status,
                    "Ignoring completion for finished upload"
                );
            }
        }

        Ok(CompletionReceipt {
            upload_id: id.clone(),
            file_path: file_path.to_string(),
            outcome,
            status: batch.status,
        })
    }

    /// Cancel an in-progress batch
    ///
    /// Terminal batches are returned unchanged. Files completed before the
    /// cancellation keep their `completed` flag.
    pub async fn cancel(&self, id: &UploadId) -> TrackerResult<UploadBatch> {
        let _guard = self.locks.acquire(id).await;

        let mut batch = self.get_report(id).await?;
        if batch.transition_to(UploadStatus::Canceled) {
            self.store.upsert(id, &batch).await?;
            info!(
                upload_id = %id,
                completed = batch.completed_file_count(),
                valid_files = batch.valid_file_count(),
                "Upload canceled"
            );
        } else {
            debug!(upload_id = %id, status = %batch.status, "Cancel ignored for finished upload");
        }
        Ok(batch)
    }
}

fn check_paths(file_paths: &[String]) -> TrackerResult<()> {
    let mut seen = HashSet::with_capacity(file_paths.len());
    for path in file_paths {
        if path.is_empty() {
            return Err(TrackerError::Validation(
                "file_path must not be empty".to_string(),
            ));
        }
        if !seen.insert(path.as_str()) {
            return Err(TrackerError::Validation(format!(
                "duplicate file_path: {}",
                path
            )));
        }
    }
    Ok(())
}
