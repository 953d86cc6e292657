use crate::application::ports::remote_gateway::RemoteGateway;
use crate::application::services::{EntityService, SyncHandle, SyncService, UploadService};
use crate::domain::entities::{AttachmentDraft, AttachmentRecord, EngineStatus, SyncReport};
use crate::infrastructure::database::Database;
use crate::infrastructure::media::ImageCompressor;
use crate::infrastructure::network::NetworkMonitor;
use crate::infrastructure::remote::HttpSyncGateway;
use crate::infrastructure::sync::{SqliteAttachmentStore, SqliteLocalStore};
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// 全サービスを束ねる合成ルート。ホストアプリは起動時に 1 つ作り、
/// ハンドラ層から参照する。
pub struct AppContext {
    pub config: AppConfig,
    pub entities: Arc<EntityService>,
    pub uploads: Arc<UploadService>,
    pub sync: Arc<SyncService>,
    pub network: Arc<NetworkMonitor>,
    sync_handle: SyncHandle,
    http_gateway: Option<Arc<HttpSyncGateway>>,
    pool: SqlitePool,
    tasks: Vec<JoinHandle<()>>,
}

impl AppContext {
    /// 実運用構成。HTTP ゲートウェイを内部で組み立てる。
    pub async fn new(config: AppConfig) -> Result<Self, AppError> {
        let http_gateway = Arc::new(HttpSyncGateway::new(&config.remote)?);
        let gateway: Arc<dyn RemoteGateway> = http_gateway.clone();
        Self::build(config, gateway, Some(http_gateway)).await
    }

    /// ゲートウェイ実装を差し替えられる構成。テストで使用する。
    pub async fn with_gateway(
        config: AppConfig,
        gateway: Arc<dyn RemoteGateway>,
    ) -> Result<Self, AppError> {
        Self::build(config, gateway, None).await
    }

    async fn build(
        config: AppConfig,
        gateway: Arc<dyn RemoteGateway>,
        http_gateway: Option<Arc<HttpSyncGateway>>,
    ) -> Result<Self, AppError> {
        let pool =
            Database::initialize(&config.database.url, config.database.max_connections).await?;

        let store = Arc::new(SqliteLocalStore::new(pool.clone(), config.sync.max_retry));
        let attachments = Arc::new(SqliteAttachmentStore::new(pool.clone()));
        let compressor =
            ImageCompressor::new(config.upload.max_dimension, config.upload.jpeg_quality);
        let network = Arc::new(NetworkMonitor::default());

        let uploads = Arc::new(UploadService::new(
            attachments,
            gateway.clone(),
            compressor,
            config.upload.max_attempts,
        ));

        let sync = Arc::new(SyncService::new(
            store.clone(),
            store.clone(),
            gateway,
            uploads.clone(),
            network.clone(),
            config.sync.clone(),
        ));

        let (sync_handle, worker) = sync.spawn_worker();
        let mut tasks = vec![worker, sync.spawn_network_listener(sync_handle.clone())];
        if config.sync.auto_sync {
            tasks.push(sync.spawn_scheduler(sync_handle.clone()));
        }

        let entities = Arc::new(EntityService::new(
            store.clone(),
            store,
            network.clone(),
            sync_handle.clone(),
        ));

        info!(db = %config.database.url, "sync engine initialized");

        Ok(Self {
            config,
            entities,
            uploads,
            sync,
            network,
            sync_handle,
            http_gateway,
            pool,
            tasks,
        })
    }

    /// 添付の取り込み。オンラインなら次の flush をすぐ要求する。
    pub async fn attach(
        &self,
        draft: AttachmentDraft,
    ) -> Result<AttachmentRecord, AppError> {
        let record = self.uploads.ingest(draft).await?;
        if self.network.is_online() {
            self.sync_handle.nudge_all();
        }
        Ok(record)
    }

    /// 認証レイヤーからのトークン供給。停止中のエンジンを再開させる。
    pub async fn set_auth_token(&self, token: Option<String>) {
        if let Some(gateway) = &self.http_gateway {
            gateway.set_token(token.clone()).await;
        }
        if token.is_some() {
            self.sync.clear_auth_required().await;
            self.sync_handle.nudge_all();
        }
    }

    pub fn set_network_online(&self, online: bool) {
        self.network.set_online(online);
    }

    pub fn is_network_online(&self) -> bool {
        self.network.is_online()
    }

    /// 手動同期(pull-to-refresh など)。完了まで待つ。
    pub async fn sync_all(&self) -> Result<SyncReport, AppError> {
        self.sync.sync_all().await
    }

    pub fn request_sync(&self) {
        self.sync_handle.nudge_all();
    }

    pub async fn engine_status(&self) -> EngineStatus {
        self.sync.status().await
    }

    pub async fn pending_count(&self) -> Result<u32, AppError> {
        self.sync.pending_count().await
    }

    pub async fn failed_count(&self) -> Result<u32, AppError> {
        self.sync.failed_count().await
    }

    pub async fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
        self.pool.close().await;
        info!("sync engine shut down");
    }
}
