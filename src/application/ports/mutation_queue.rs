use crate::domain::entities::MutationRecord;
use crate::domain::value_objects::{EntityKind, LocalId};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 永続ミューテーションキュー。投入は `LocalStore::commit_write` 経由のみ。
#[async_trait]
pub trait MutationQueue: Send + Sync {
    /// Oldest pending records for a kind, transitioned to in-flight. Keys
    /// that still hold an in-flight or failed record are skipped to keep
    /// per-key FIFO ordering.
    async fn dequeue_next_batch(
        &self,
        kind: EntityKind,
        max: u32,
    ) -> Result<Vec<MutationRecord>, AppError>;

    async fn mark_applied(&self, id: i64) -> Result<(), AppError>;

    /// Increments `attempts`; returns the record to pending unless the
    /// failure is permanent or the retry ceiling is reached, in which case
    /// it is flagged failed for manual retry.
    async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        permanent: bool,
    ) -> Result<MutationRecord, AppError>;

    /// Returns an in-flight record to pending without counting an attempt.
    /// Used when a cycle halts for reasons unrelated to the record itself
    /// (auth failure, shutdown mid-batch).
    async fn release_in_flight(&self, id: i64) -> Result<(), AppError>;

    /// Manual retry affordance: resets a failed record to pending with a
    /// fresh attempt budget.
    async fn retry_failed(&self, kind: EntityKind, entity_id: &LocalId)
        -> Result<bool, AppError>;

    async fn purge_applied(&self, before: DateTime<Utc>) -> Result<u32, AppError>;

    async fn count_pending(&self) -> Result<u32, AppError>;

    async fn count_failed(&self) -> Result<u32, AppError>;

    async fn has_pending_for(
        &self,
        kind: EntityKind,
        entity_id: &LocalId,
    ) -> Result<bool, AppError>;
}
