//! SQLite upload store
//!
//! One row per batch. Scalar fields get their own columns; the file list is
//! kept as a JSON array since it is always read and written as a whole.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::{BatchStore, StoreError, StoreResult};
use crate::models::{FileEntry, UploadBatch, UploadId, UploadStatus};
use crate::validation::ContentCategory;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS upload_batches (
        upload_id TEXT PRIMARY KEY,
        content_type TEXT NOT NULL,
        status TEXT NOT NULL,
        files TEXT NOT NULL,
        created_at TEXT NOT NULL,
        ended_at TEXT,
        updated_at TEXT NOT NULL
    )
"#;

/// Store backed by an SQLite database
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file and ensure the schema exists
    pub async fn connect(db_path: &Path) -> StoreResult<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Some(Duration::from_secs(60)))
            .connect(&db_url)
            .await
            .map_err(db_error)?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database, mostly for tests
    ///
    /// Each SQLite connection to `:memory:` gets its own database, so the pool
    /// is pinned to one connection that is never recycled.
    pub async fn connect_in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(db_error)?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating the table if missing
    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(db_error)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Connection-level failures mean the database cannot be reached at all
fn db_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        other => StoreError::Database(other),
    }
}

fn corrupt(upload_id: &str, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        upload_id: upload_id.to_string(),
        reason: reason.into(),
    }
}

fn parse_timestamp(upload_id: &str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(upload_id, format!("bad timestamp {:?}: {}", value, e)))
}

fn batch_from_row(row: &SqliteRow) -> StoreResult<UploadBatch> {
    let upload_id: String = row.try_get("upload_id")?;

    let content_type: String = row.try_get("content_type")?;
    let content_type = content_type
        .parse::<ContentCategory>()
        .map_err(|e| corrupt(&upload_id, e.to_string()))?;

    let status: String = row.try_get("status")?;
    let status = status
        .parse::<UploadStatus>()
        .map_err(|e| corrupt(&upload_id, e))?;

    let files: String = row.try_get("files")?;
    let files: Vec<FileEntry> = serde_json::from_str(&files)?;

    let created_at: String = row.try_get("created_at")?;
    let created_at = parse_timestamp(&upload_id, &created_at)?;

    let ended_at: Option<String> = row.try_get("ended_at")?;
    let ended_at = ended_at
        .map(|s| parse_timestamp(&upload_id, &s))
        .transpose()?;

    Ok(UploadBatch {
        upload_id: UploadId::from(upload_id),
        content_type,
        files,
        status,
        created_at,
        ended_at,
    })
}

#[async_trait]
impl BatchStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn upsert(&self, id: &UploadId, batch: &UploadBatch) -> StoreResult<()> {
        // Prepare all data before touching the pool
        let files = serde_json::to_string(&batch.files)?;
        let created_at = batch.created_at.to_rfc3339();
        let ended_at = batch.ended_at.map(|dt| dt.to_rfc3339());
        let updated_at = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO upload_batches (
                upload_id, content_type, status, files, created_at, ended_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(upload_id) DO UPDATE SET
                content_type = excluded.content_type,
                status = excluded.status,
                files = excluded.files,
                ended_at = excluded.ended_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id.as_str())
        .bind(batch.content_type.as_str())
        .bind(batch.status.as_str())
        .bind(&files)
        .bind(&created_at)
        .bind(&ended_at)
        .bind(&updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        debug!(upload_id = %id, status = %batch.status, "Batch saved");
        Ok(())
    }

    async fn find(&self, id: &UploadId) -> StoreResult<Option<UploadBatch>> {
        let row = sqlx::query(
            r#"
            SELECT upload_id, content_type, status, files, created_at, ended_at
            FROM upload_batches
            WHERE upload_id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.as_ref().map(batch_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_preserves_batch() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        let mut batch = UploadBatch::new(
            ContentCategory::Images,
            vec!["a.jpg".to_string(), "b.txt".to_string()],
        );
        batch.record_completion("a.jpg");

        store.upsert(&batch.upload_id, &batch).await.unwrap();
        let found = store.find(&batch.upload_id).await.unwrap().unwrap();

        assert_eq!(found.upload_id, batch.upload_id);
        assert_eq!(found.content_type, ContentCategory::Images);
        assert_eq!(found.files, batch.files);
        assert_eq!(found.status, UploadStatus::Completed);
        assert_eq!(found.created_at, batch.created_at);
        assert_eq!(found.ended_at, batch.ended_at);
    }

    #[tokio::test]
    async fn test_missing_row() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        assert!(store
            .find(&UploadId::from("unknown-id"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_single_row() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        let mut batch = UploadBatch::new(ContentCategory::Podcasts, vec!["ep.mp3".to_string()]);
        store.upsert(&batch.upload_id, &batch).await.unwrap();

        batch.transition_to(UploadStatus::Canceled);
        store.upsert(&batch.upload_id, &batch).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM upload_batches")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);

        let found = store.find(&batch.upload_id).await.unwrap().unwrap();
        assert_eq!(found.status, UploadStatus::Canceled);
        assert!(found.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        store.pool().close().await;

        let result = store.find(&UploadId::from("any")).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_corrupt_row_is_reported() {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO upload_batches VALUES ('bad', 'videos', 'in_progress', '[]', ?, NULL, ?)",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(store.pool())
        .await
        .unwrap();

        let result = store.find(&UploadId::from("bad")).await;
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }
}
