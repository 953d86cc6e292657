use crate::application::ports::local_store::LocalStore;
use crate::application::ports::mutation_queue::MutationQueue;
use crate::application::services::sync_service::SyncHandle;
use crate::domain::entities::{EntityRecord, EntityWrite};
use crate::domain::value_objects::{EntityKind, LocalId, MutationPayload};
use crate::infrastructure::network::NetworkMonitor;
use crate::shared::error::AppError;
use std::sync::Arc;
use tracing::debug;

/// ドメインエンティティへの書き込み窓口。すべての書き込みはまず
/// ローカルへコミットされ、その場で読める。ネットワークは成功条件に
/// 一切関与しない。
pub struct EntityService {
    store: Arc<dyn LocalStore>,
    queue: Arc<dyn MutationQueue>,
    network: Arc<NetworkMonitor>,
    sync: SyncHandle,
}

impl EntityService {
    pub fn new(
        store: Arc<dyn LocalStore>,
        queue: Arc<dyn MutationQueue>,
        network: Arc<NetworkMonitor>,
        sync: SyncHandle,
    ) -> Self {
        Self {
            store,
            queue,
            network,
            sync,
        }
    }

    pub async fn create(
        &self,
        kind: EntityKind,
        payload: MutationPayload,
    ) -> Result<EntityRecord, AppError> {
        let local_id = LocalId::generate();
        self.store
            .commit_write(EntityWrite::create(kind, local_id.clone(), payload))
            .await?;
        self.nudge(kind);

        self.store
            .get_entity(kind, &local_id)
            .await?
            .ok_or_else(|| AppError::Internal("created entity missing after commit".to_string()))
    }

    pub async fn update(
        &self,
        kind: EntityKind,
        local_id: &LocalId,
        payload: MutationPayload,
    ) -> Result<EntityRecord, AppError> {
        self.ensure_exists(kind, local_id).await?;
        self.store
            .commit_write(EntityWrite::update(kind, local_id.clone(), payload))
            .await?;
        self.nudge(kind);

        self.store
            .get_entity(kind, local_id)
            .await?
            .ok_or_else(|| AppError::Internal("updated entity missing after commit".to_string()))
    }

    pub async fn delete(&self, kind: EntityKind, local_id: &LocalId) -> Result<(), AppError> {
        self.ensure_exists(kind, local_id).await?;
        self.store
            .commit_write(EntityWrite::delete(kind, local_id.clone()))
            .await?;
        self.nudge(kind);
        Ok(())
    }

    pub async fn get(
        &self,
        kind: EntityKind,
        local_id: &LocalId,
    ) -> Result<Option<EntityRecord>, AppError> {
        self.store.get_entity(kind, local_id).await
    }

    pub async fn list(&self, kind: EntityKind) -> Result<Vec<EntityRecord>, AppError> {
        self.store.list_entities(kind).await
    }

    pub async fn has_pending_changes(
        &self,
        kind: EntityKind,
        local_id: &LocalId,
    ) -> Result<bool, AppError> {
        self.queue.has_pending_for(kind, local_id).await
    }

    /// failed になったミューテーションをユーザー操作で再試行対象に戻す。
    pub async fn retry_failed(
        &self,
        kind: EntityKind,
        local_id: &LocalId,
    ) -> Result<bool, AppError> {
        let reset = self.queue.retry_failed(kind, local_id).await?;
        if reset {
            self.nudge(kind);
        }
        Ok(reset)
    }

    async fn ensure_exists(&self, kind: EntityKind, local_id: &LocalId) -> Result<(), AppError> {
        self.store
            .get_entity(kind, local_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| {
                AppError::NotFound(format!("{} not found: {local_id}", kind.as_str()))
            })
    }

    fn nudge(&self, kind: EntityKind) {
        if self.network.is_online() {
            self.sync.nudge(kind);
        } else {
            debug!(kind = kind.as_str(), "offline, write queued without nudge");
        }
    }
}
