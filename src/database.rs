use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::errors::{AppError, AppResult};
use crate::models::{MediaKind, UploadItem, UploadStatus};

/// Media metadata row written once an upload has been stored
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MediaRecord {
    pub id: String,
    pub shelter_id: String,
    pub animal_id: String,
    pub kennel_id: String,
    pub room_id: String,
    pub walk_id: Option<String>,
    pub kind: String,
    pub content_type: String,
    pub storage_path: String,
    pub url: String,
    pub file_name: String,
    pub file_size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub is_intake: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
}

#[derive(Clone)]
pub struct MediaDatabase {
    pool: SqlitePool,
}

impl MediaDatabase {
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        log::info!("Connecting to database: {}", database_url);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Private in-memory database; a single connection so every query sees the same data
    pub async fn in_memory() -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS media_records (
                id TEXT PRIMARY KEY,
                shelter_id TEXT NOT NULL,
                animal_id TEXT NOT NULL,
                kennel_id TEXT NOT NULL,
                room_id TEXT NOT NULL,
                walk_id TEXT,
                kind TEXT NOT NULL,
                content_type TEXT NOT NULL,
                storage_path TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL,
                file_name TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                width INTEGER,
                height INTEGER,
                is_intake BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS upload_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id TEXT NOT NULL,
                shelter_id TEXT NOT NULL,
                file_name TEXT NOT NULL,
                file_hash TEXT,
                file_size INTEGER,
                upload_status TEXT NOT NULL,
                error_message TEXT,
                retry_count INTEGER DEFAULT 0,
                uploaded_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_media_animal ON media_records(shelter_id, animal_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_media_walk ON media_records(walk_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_upload_history_shelter ON upload_history(shelter_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_upload_history_date ON upload_history(uploaded_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_upload_history_hash ON upload_history(file_hash)")
            .execute(&self.pool)
            .await?;

        log::info!("Database schema ready");
        Ok(())
    }

    /// Insert the media record for a successfully stored item
    pub async fn record_media(&self, item: &UploadItem, storage_path: &str) -> AppResult<()> {
        let url = match (&item.status, &item.uploaded_url) {
            (UploadStatus::Success, Some(url)) => url.clone(),
            _ => {
                return Err(AppError::validation(
                    "status",
                    "Only successful uploads can be recorded",
                ))
            }
        };

        sqlx::query(
            r#"
            INSERT INTO media_records
            (id, shelter_id, animal_id, kennel_id, room_id, walk_id, kind, content_type,
             storage_path, url, file_name, file_size, width, height, is_intake, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.to_string())
        .bind(&item.target.shelter_id)
        .bind(&item.target.animal_id)
        .bind(&item.target.kennel_id)
        .bind(&item.target.room_id)
        .bind(&item.target.walk_id)
        .bind(item.kind.as_str())
        .bind(&item.content_type)
        .bind(storage_path)
        .bind(url)
        .bind(&item.file_name)
        .bind(item.file_size as i64)
        .bind(item.width.map(i64::from))
        .bind(item.height.map(i64::from))
        .bind(item.is_intake)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        log::info!(
            "Recorded {} {} for animal {} ({})",
            item.kind.as_str(),
            item.id,
            item.target.animal_id,
            storage_path
        );
        Ok(())
    }

    /// Append the final outcome of an upload to the history
    pub async fn record_upload(&self, item: &UploadItem, file_hash: Option<String>) -> AppResult<()> {
        let status = match item.status {
            UploadStatus::Success => "success",
            UploadStatus::Error => "failed",
            other => {
                return Err(AppError::validation(
                    "status",
                    &format!("Cannot record an upload that is still {}", other),
                ))
            }
        };

        sqlx::query(
            r#"
            INSERT INTO upload_history
            (item_id, shelter_id, file_name, file_hash, file_size, upload_status, error_message, retry_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.to_string())
        .bind(&item.target.shelter_id)
        .bind(&item.file_name)
        .bind(file_hash)
        .bind(item.file_size as i64)
        .bind(status)
        .bind(&item.error)
        .bind(item.retry_count as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_media_for_animal(
        &self,
        shelter_id: &str,
        animal_id: &str,
    ) -> AppResult<Vec<MediaRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM media_records WHERE shelter_id = ? AND animal_id = ? ORDER BY created_at DESC",
        )
        .bind(shelter_id)
        .bind(animal_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    pub async fn get_media_for_walk(&self, walk_id: &str) -> AppResult<Vec<MediaRecord>> {
        let rows = sqlx::query("SELECT * FROM media_records WHERE walk_id = ? ORDER BY created_at DESC")
            .bind(walk_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    pub async fn delete_media_record(&self, id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM media_records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Database(sqlx::Error::RowNotFound));
        }

        log::info!("Deleted media record {}", id);
        Ok(())
    }

    pub async fn upload_stats(&self, shelter_id: &str) -> AppResult<UploadStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN upload_status = 'success' THEN 1 ELSE 0 END), 0) AS successful,
                COALESCE(SUM(CASE WHEN upload_status = 'failed' THEN 1 ELSE 0 END), 0) AS failed
            FROM upload_history WHERE shelter_id = ?
            "#,
        )
        .bind(shelter_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(UploadStats {
            total: row.get("total"),
            successful: row.get("successful"),
            failed: row.get("failed"),
        })
    }

    /// Whether content with this hash was already uploaded for the shelter
    pub async fn has_uploaded_hash(&self, shelter_id: &str, file_hash: &str) -> AppResult<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM upload_history WHERE shelter_id = ? AND file_hash = ? AND upload_status = 'success' LIMIT 1",
        )
        .bind(shelter_id)
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    pub async fn cleanup_old_upload_history(&self, days: u32) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM upload_history WHERE uploaded_at < datetime('now', '-' || ? || ' days')",
        )
        .bind(days as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn row_to_record(row: &SqliteRow) -> MediaRecord {
    MediaRecord {
        id: row.get("id"),
        shelter_id: row.get("shelter_id"),
        animal_id: row.get("animal_id"),
        kennel_id: row.get("kennel_id"),
        room_id: row.get("room_id"),
        walk_id: row.get("walk_id"),
        kind: row.get("kind"),
        content_type: row.get("content_type"),
        storage_path: row.get("storage_path"),
        url: row.get("url"),
        file_name: row.get("file_name"),
        file_size: row.get("file_size"),
        width: row.get("width"),
        height: row.get("height"),
        is_intake: row.get("is_intake"),
        created_at: row.get("created_at"),
    }
}

impl MediaRecord {
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self.kind.as_str() {
            "photo" => Some(MediaKind::Photo),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}
