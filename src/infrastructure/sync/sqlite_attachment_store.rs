use crate::application::ports::attachment_store::AttachmentStore;
use crate::domain::entities::AttachmentRecord;
use crate::domain::value_objects::LocalId;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};

use super::rows::{attachment_record_from_row, AttachmentRow};

/// attachments テーブルの sqlx/SQLite 実装。
pub struct SqliteAttachmentStore {
    pool: Pool<Sqlite>,
}

impl SqliteAttachmentStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttachmentStore for SqliteAttachmentStore {
    async fn insert(&self, record: &AttachmentRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO attachments (
                id, owner_id, kind, mime_type, data,
                remote_id, remote_path, sync_status,
                upload_attempts, last_upload_error, delete_requested, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(record.id.as_str())
        .bind(record.owner_id.as_str())
        .bind(record.kind.as_str())
        .bind(&record.mime_type)
        .bind(&record.data)
        .bind(&record.remote_id)
        .bind(&record.remote_path)
        .bind(record.sync_status.as_str())
        .bind(i64::from(record.upload_attempts))
        .bind(&record.last_upload_error)
        .bind(record.delete_requested)
        .bind(record.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &LocalId) -> Result<Option<AttachmentRecord>, AppError> {
        let row = sqlx::query_as::<_, AttachmentRow>("SELECT * FROM attachments WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(attachment_record_from_row).transpose()
    }

    async fn list_for_owner(&self, owner_id: &LocalId) -> Result<Vec<AttachmentRecord>, AppError> {
        let rows = sqlx::query_as::<_, AttachmentRow>(
            r#"
            SELECT * FROM attachments
            WHERE owner_id = ?1 AND delete_requested = 0
            ORDER BY created_at ASC
            "#,
        )
        .bind(owner_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(attachment_record_from_row).collect()
    }

    async fn mark_uploading(&self, id: &LocalId) -> Result<(), AppError> {
        sqlx::query("UPDATE attachments SET sync_status = 'uploading' WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_synced(
        &self,
        id: &LocalId,
        remote_id: &str,
        remote_path: &str,
        _synced_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE attachments
            SET sync_status = 'synced', remote_id = ?2, remote_path = ?3,
                last_upload_error = NULL
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .bind(remote_id)
        .bind(remote_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: &LocalId, error: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE attachments
            SET sync_status = 'failed',
                upload_attempts = upload_attempts + 1,
                last_upload_error = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_for_retry(&self, id: &LocalId) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE attachments
            SET sync_status = 'pending', upload_attempts = 0, last_upload_error = NULL
            WHERE id = ?1 AND sync_status = 'failed'
            "#,
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release_uploading(&self, id: &LocalId) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE attachments SET sync_status = 'pending'
            WHERE id = ?1 AND sync_status = 'uploading'
            "#,
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn request_delete(&self, id: &LocalId) -> Result<(), AppError> {
        sqlx::query("UPDATE attachments SET delete_requested = 1 WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove(&self, id: &LocalId) -> Result<(), AppError> {
        sqlx::query("DELETE FROM attachments WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upload_candidates(
        &self,
        max_attempts: u32,
    ) -> Result<Vec<AttachmentRecord>, AppError> {
        let rows = sqlx::query_as::<_, AttachmentRow>(
            r#"
            SELECT * FROM attachments
            WHERE delete_requested = 0
              AND (
                    sync_status = 'pending'
                 OR (sync_status = 'failed' AND upload_attempts < ?1)
              )
            ORDER BY created_at ASC
            "#,
        )
        .bind(i64::from(max_attempts))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(attachment_record_from_row).collect()
    }

    async fn delete_tombstones(&self) -> Result<Vec<AttachmentRecord>, AppError> {
        let rows = sqlx::query_as::<_, AttachmentRow>(
            "SELECT * FROM attachments WHERE delete_requested = 1",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(attachment_record_from_row).collect()
    }
}
