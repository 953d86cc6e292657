use crate::domain::entities::AttachmentRecord;
use crate::domain::value_objects::LocalId;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 添付バイナリとその状態機械の永続化。
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn insert(&self, record: &AttachmentRecord) -> Result<(), AppError>;

    async fn get(&self, id: &LocalId) -> Result<Option<AttachmentRecord>, AppError>;

    async fn list_for_owner(&self, owner_id: &LocalId) -> Result<Vec<AttachmentRecord>, AppError>;

    async fn mark_uploading(&self, id: &LocalId) -> Result<(), AppError>;

    async fn mark_synced(
        &self,
        id: &LocalId,
        remote_id: &str,
        remote_path: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Failed transition: increments `upload_attempts` and records the error.
    /// The local copy stays intact for replay.
    async fn mark_failed(&self, id: &LocalId, error: &str) -> Result<(), AppError>;

    /// Manual retry: back to pending with a fresh attempt budget.
    async fn reset_for_retry(&self, id: &LocalId) -> Result<(), AppError>;

    /// Returns an uploading record to pending without counting an attempt.
    /// Used when a flush halts for reasons unrelated to the record itself.
    async fn release_uploading(&self, id: &LocalId) -> Result<(), AppError>;

    /// Tombstones a synced attachment for remote delete cascade.
    async fn request_delete(&self, id: &LocalId) -> Result<(), AppError>;

    async fn remove(&self, id: &LocalId) -> Result<(), AppError>;

    /// Pending records plus failed records still under the attempt ceiling,
    /// excluding tombstones. What the engine resubmits on each trigger.
    async fn upload_candidates(
        &self,
        max_attempts: u32,
    ) -> Result<Vec<AttachmentRecord>, AppError>;

    async fn delete_tombstones(&self) -> Result<Vec<AttachmentRecord>, AppError>;
}
