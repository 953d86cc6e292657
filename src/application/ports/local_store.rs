use crate::application::ports::remote_gateway::RemoteEntity;
use crate::domain::entities::{EntityRecord, EntityWrite, MutationRecord};
use crate::domain::value_objects::{EntityKind, LocalId};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 端末側の永続ストア。エンティティ行の書き込みと同期キュー投入は
/// 常に同一トランザクションで行われる（all-or-nothing）。
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Optimistic local commit: upsert (or soft-delete) the entity row and
    /// supersede-or-enqueue the mutation atomically. A storage failure here
    /// is fatal to the write and surfaces synchronously to the caller.
    ///
    /// Returns `None` when a delete collapsed a still-pending create — the
    /// entity never existed remotely and no mutation remains queued.
    async fn commit_write(&self, write: EntityWrite) -> Result<Option<MutationRecord>, AppError>;

    async fn get_entity(
        &self,
        kind: EntityKind,
        local_id: &LocalId,
    ) -> Result<Option<EntityRecord>, AppError>;

    /// Soft-deleted rows are excluded.
    async fn list_entities(&self, kind: EntityKind) -> Result<Vec<EntityRecord>, AppError>;

    /// Records the remote acknowledgment on the entity row.
    async fn mark_synced(
        &self,
        kind: EntityKind,
        local_id: &LocalId,
        remote_id: Option<&str>,
        synced_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Upserts authoritative remote rows, correlating on `remote_id` /
    /// `local_id`. Keys with a queued mutation are skipped so a pull can
    /// neither resurrect a pending delete nor clobber a pending update.
    async fn apply_remote_batch(
        &self,
        kind: EntityKind,
        entities: Vec<RemoteEntity>,
    ) -> Result<u32, AppError>;

    async fn pull_cursor(&self, kind: EntityKind) -> Result<Option<DateTime<Utc>>, AppError>;

    async fn store_pull_cursor(
        &self,
        kind: EntityKind,
        pulled_at: DateTime<Utc>,
    ) -> Result<(), AppError>;
}
