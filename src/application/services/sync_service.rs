use crate::application::ports::local_store::LocalStore;
use crate::application::ports::mutation_queue::MutationQueue;
use crate::application::ports::remote_gateway::RemoteGateway;
use crate::application::services::upload_service::UploadService;
use crate::domain::entities::{EngineStatus, MutationRecord, SyncReport, SyncState};
use crate::domain::value_objects::EntityKind;
use crate::infrastructure::network::NetworkMonitor;
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// ワーカーへの同期要求。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRequest {
    Kind(EntityKind),
    All,
}

/// 書き込みパスから同期をつつくための軽量ハンドル。
/// チャネルが満杯なら黙って落とす。ワーカーはどうせ追い付く。
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncRequest>,
}

impl SyncHandle {
    pub fn nudge(&self, kind: EntityKind) {
        let _ = self.tx.try_send(SyncRequest::Kind(kind));
    }

    pub fn nudge_all(&self) {
        let _ = self.tx.try_send(SyncRequest::All);
    }
}

/// 同期エンジン本体。push フェーズと pull フェーズを種別ごとに回し、
/// 添付の flush と適用済みレコードの掃除までを 1 サイクルとして扱う。
pub struct SyncService {
    store: Arc<dyn LocalStore>,
    queue: Arc<dyn MutationQueue>,
    gateway: Arc<dyn RemoteGateway>,
    uploads: Arc<UploadService>,
    network: Arc<NetworkMonitor>,
    status: Arc<RwLock<EngineStatus>>,
    // 同一種別のサイクルは合流させる
    kinds_in_flight: Mutex<HashSet<EntityKind>>,
    config: SyncConfig,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn LocalStore>,
        queue: Arc<dyn MutationQueue>,
        gateway: Arc<dyn RemoteGateway>,
        uploads: Arc<UploadService>,
        network: Arc<NetworkMonitor>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            queue,
            gateway,
            uploads,
            network,
            status: Arc::new(RwLock::new(EngineStatus::default())),
            kinds_in_flight: Mutex::new(HashSet::new()),
            config,
        }
    }

    pub async fn status(&self) -> EngineStatus {
        self.status.read().await.clone()
    }

    pub async fn pending_count(&self) -> Result<u32, AppError> {
        self.queue.count_pending().await
    }

    pub async fn failed_count(&self) -> Result<u32, AppError> {
        self.queue.count_failed().await
    }

    /// 再認証後にシェルが呼ぶ。キューはそのまま残っているので、
    /// 続けて nudge すれば中断地点から再開する。
    pub async fn clear_auth_required(&self) {
        self.status.write().await.auth_required = false;
    }

    /// 全種別の同期 + 添付 flush + 適用済みレコードの掃除。
    pub async fn sync_all(&self) -> Result<SyncReport, AppError> {
        let mut report = SyncReport::default();

        if !self.network.is_online() {
            self.status.write().await.state = SyncState::Disabled;
            report.pending = self.queue.count_pending().await?;
            return Ok(report);
        }

        for kind in EntityKind::all() {
            match self.sync_entity(kind).await {
                Ok(partial) => report.merge(partial),
                Err(AppError::Unauthorized) => return Err(AppError::Unauthorized),
                Err(err) => {
                    warn!(kind = kind.as_str(), error = %err, "sync cycle failed");
                    self.status.write().await.sync_errors += 1;
                }
            }
        }

        match self.uploads.flush_pending().await {
            Ok(upload_report) => {
                debug!(
                    uploaded = upload_report.uploaded,
                    failed = upload_report.failed,
                    deleted = upload_report.deleted,
                    "attachment flush finished"
                );
            }
            Err(AppError::Unauthorized) => {
                self.status.write().await.auth_required = true;
                return Err(AppError::Unauthorized);
            }
            Err(err) => {
                warn!(error = %err, "attachment flush failed");
                self.status.write().await.sync_errors += 1;
            }
        }

        let cutoff = Utc::now() - Duration::hours(self.config.retain_applied_hours as i64);
        let purged = self.queue.purge_applied(cutoff).await?;
        if purged > 0 {
            debug!(purged, "purged applied mutations");
        }

        report.pending = self.queue.count_pending().await?;
        Ok(report)
    }

    /// 1 種別の push + pull サイクル。同じ種別が既に走っていれば何もしない。
    pub async fn sync_entity(&self, kind: EntityKind) -> Result<SyncReport, AppError> {
        if !self.network.is_online() {
            self.status.write().await.state = SyncState::Disabled;
            let mut report = SyncReport::default();
            report.pending = self.queue.count_pending().await?;
            return Ok(report);
        }
        if self.status.read().await.auth_required {
            return Ok(SyncReport::default());
        }

        {
            let mut in_flight = self.kinds_in_flight.lock().await;
            if !in_flight.insert(kind) {
                debug!(kind = kind.as_str(), "sync already running, coalesced");
                return Ok(SyncReport::default());
            }
        }

        let result = self.run_cycle(kind).await;
        self.kinds_in_flight.lock().await.remove(&kind);

        let mut status = self.status.write().await;
        match result {
            Ok(report) => {
                status.state = SyncState::Idle;
                status.last_sync = Some(Utc::now());
                drop(status);
                Ok(report)
            }
            Err(err) => {
                status.state = SyncState::Idle;
                if matches!(err, AppError::Unauthorized) {
                    status.auth_required = true;
                } else {
                    status.sync_errors += 1;
                }
                drop(status);
                Err(err)
            }
        }
    }

    async fn run_cycle(&self, kind: EntityKind) -> Result<SyncReport, AppError> {
        let mut report = SyncReport::default();

        // push フェーズ
        self.status.write().await.state = SyncState::Pushing;
        loop {
            let batch = self
                .queue
                .dequeue_next_batch(kind, self.config.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }

            let had_failure = self.push_batch(kind, batch, &mut report).await?;
            // 失敗したレコードを同一サイクル内で再試行しない
            if had_failure {
                break;
            }
        }

        // pull フェーズ
        self.status.write().await.state = SyncState::Pulling;
        let since = self.store.pull_cursor(kind).await?;
        let entities = self.gateway.pull_since(kind, since).await?;
        if !entities.is_empty() {
            let watermark = entities
                .iter()
                .map(|e| e.updated_at)
                .max()
                .unwrap_or_else(Utc::now);
            report.pulled = self.store.apply_remote_batch(kind, entities).await?;
            self.store.store_pull_cursor(kind, watermark).await?;
        }

        report.pending = self.queue.count_pending().await?;
        info!(
            kind = kind.as_str(),
            pushed = report.pushed,
            failed = report.failed,
            pulled = report.pulled,
            "sync cycle finished"
        );
        Ok(report)
    }

    /// バッチを順に送る。認証エラーは現在以降のレコードをすべて
    /// pending へ戻してから中断する(試行回数は消費しない)。
    async fn push_batch(
        &self,
        kind: EntityKind,
        batch: Vec<MutationRecord>,
        report: &mut SyncReport,
    ) -> Result<bool, AppError> {
        let mut had_failure = false;

        for (index, record) in batch.iter().enumerate() {
            match self.gateway.push_mutation(record).await {
                Ok(ack) => {
                    self.queue.mark_applied(record.id).await?;
                    self.store
                        .mark_synced(kind, &record.entity_id, ack.remote_id.as_deref(), Utc::now())
                        .await?;
                    report.pushed += 1;
                }
                Err(AppError::Unauthorized) => {
                    for remaining in &batch[index..] {
                        self.queue.release_in_flight(remaining.id).await?;
                    }
                    return Err(AppError::Unauthorized);
                }
                Err(err) => {
                    let permanent = matches!(err, AppError::ValidationError(_));
                    let failed = self
                        .queue
                        .mark_failed(record.id, &err.to_string(), permanent)
                        .await?;
                    warn!(
                        mutation_id = record.id,
                        kind = kind.as_str(),
                        attempts = failed.attempts,
                        permanent,
                        error = %err,
                        "mutation push failed"
                    );
                    report.failed += 1;
                    had_failure = true;
                }
            }
        }

        Ok(had_failure)
    }

    /// 要求を逐次処理するワーカーを起動する。
    pub fn spawn_worker(self: &Arc<Self>) -> (SyncHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(self.config.queue_capacity);
        let service = Arc::clone(self);

        let worker = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let result = match request {
                    SyncRequest::Kind(kind) => service.sync_entity(kind).await,
                    SyncRequest::All => service.sync_all().await,
                };
                if let Err(err) = result {
                    warn!(error = %err, "sync request failed");
                }
            }
        });

        (SyncHandle { tx }, worker)
    }

    /// オフラインからオンラインへの遷移でフル同期を要求する。
    pub fn spawn_network_listener(self: &Arc<Self>, handle: SyncHandle) -> JoinHandle<()> {
        let mut rx = self.network.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                if *rx.borrow_and_update() {
                    info!("network restored, requesting full sync");
                    handle.nudge_all();
                }
            }
        })
    }

    /// 定期同期。`auto_sync` が無効なら呼ばれない。
    pub fn spawn_scheduler(self: &Arc<Self>, handle: SyncHandle) -> JoinHandle<()> {
        let interval_secs = self.config.sync_interval;
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            // 起動直後の即時 tick は捨てる
            interval.tick().await;
            loop {
                interval.tick().await;
                handle.nudge_all();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::remote_gateway::{RemoteAck, RemoteEntity, UploadAck};
    use crate::domain::entities::{AttachmentRecord, EntityWrite};
    use crate::domain::value_objects::{LocalId, MutationPayload};
    use crate::infrastructure::database::Database;
    use crate::infrastructure::media::ImageCompressor;
    use crate::infrastructure::sync::{SqliteAttachmentStore, SqliteLocalStore};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    struct TestGateway {
        pushed: StdMutex<Vec<(i64, String)>>,
        push_results: StdMutex<VecDeque<Result<RemoteAck, AppError>>>,
        pull_entities: StdMutex<Vec<RemoteEntity>>,
        push_gate: StdMutex<Option<Arc<tokio::sync::Semaphore>>>,
    }

    impl TestGateway {
        fn new() -> Self {
            Self {
                pushed: StdMutex::new(Vec::new()),
                push_results: StdMutex::new(VecDeque::new()),
                pull_entities: StdMutex::new(Vec::new()),
                push_gate: StdMutex::new(None),
            }
        }

        fn script_push(&self, result: Result<RemoteAck, AppError>) {
            self.push_results.lock().unwrap().push_back(result);
        }

        /// push を 1 件ごとにセマフォで堰き止める。並行性のテスト用。
        fn gate_pushes(&self, gate: Arc<tokio::sync::Semaphore>) {
            *self.push_gate.lock().unwrap() = Some(gate);
        }

        fn script_pull(&self, entities: Vec<RemoteEntity>) {
            *self.pull_entities.lock().unwrap() = entities;
        }

        fn pushed_ids(&self) -> Vec<i64> {
            self.pushed.lock().unwrap().iter().map(|(id, _)| *id).collect()
        }
    }

    #[async_trait]
    impl RemoteGateway for TestGateway {
        async fn push_mutation(&self, record: &MutationRecord) -> Result<RemoteAck, AppError> {
            self.pushed
                .lock()
                .unwrap()
                .push((record.id, record.entity_id.to_string()));
            let gate = self.push_gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.acquire().await.unwrap().forget();
            }
            self.push_results.lock().unwrap().pop_front().unwrap_or_else(|| {
                Ok(RemoteAck {
                    remote_id: Some(format!("remote-{}", record.id)),
                })
            })
        }

        async fn pull_since(
            &self,
            _kind: EntityKind,
            _since: Option<DateTime<Utc>>,
        ) -> Result<Vec<RemoteEntity>, AppError> {
            Ok(std::mem::take(&mut *self.pull_entities.lock().unwrap()))
        }

        async fn upload_attachment(
            &self,
            record: &AttachmentRecord,
        ) -> Result<UploadAck, AppError> {
            Ok(UploadAck {
                id: format!("att-{}", record.id),
                public_url: format!("/uploads/{}", record.id),
            })
        }

        async fn delete_attachment(&self, _remote_id: &str) -> Result<(), AppError> {
            Ok(())
        }
    }

    struct Harness {
        service: Arc<SyncService>,
        store: Arc<SqliteLocalStore>,
        gateway: Arc<TestGateway>,
        network: Arc<NetworkMonitor>,
    }

    async fn setup(online: bool) -> Harness {
        let pool = Database::in_memory().await.unwrap();
        let store = Arc::new(SqliteLocalStore::new(pool.clone(), 3));
        let attachments = Arc::new(SqliteAttachmentStore::new(pool));
        let gateway = Arc::new(TestGateway::new());
        let network = Arc::new(NetworkMonitor::new(online));
        let uploads = Arc::new(UploadService::new(
            attachments,
            gateway.clone(),
            ImageCompressor::new(1600, 75),
            3,
        ));
        let config = SyncConfig {
            max_retry: 3,
            ..SyncConfig::default()
        };
        let service = Arc::new(SyncService::new(
            store.clone(),
            store.clone(),
            gateway.clone(),
            uploads,
            network.clone(),
            config,
        ));
        Harness {
            service,
            store,
            gateway,
            network,
        }
    }

    async fn commit_create(store: &SqliteLocalStore, kind: EntityKind, name: &str) -> LocalId {
        let id = LocalId::generate();
        store
            .commit_write(EntityWrite::create(
                kind,
                id.clone(),
                MutationPayload::new(json!({ "name": name })).unwrap(),
            ))
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn push_drains_queue_and_marks_entities_synced() {
        let h = setup(true).await;
        let a = commit_create(&h.store, EntityKind::Clients, "A").await;
        let b = commit_create(&h.store, EntityKind::Clients, "B").await;

        let report = h.service.sync_entity(EntityKind::Clients).await.unwrap();
        assert_eq!(report.pushed, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.pending, 0);

        for id in [&a, &b] {
            let entity = h.store.get_entity(EntityKind::Clients, id).await.unwrap().unwrap();
            assert!(entity.synced_at.is_some());
            assert!(entity.remote_id.is_some());
        }
        assert_eq!(h.gateway.pushed_ids().len(), 2);
    }

    #[tokio::test]
    async fn transient_failure_returns_record_to_pending() {
        let h = setup(true).await;
        let id = commit_create(&h.store, EntityKind::Quotes, "Q").await;
        h.gateway
            .script_push(Err(AppError::Network("503".to_string())));

        let report = h.service.sync_entity(EntityKind::Quotes).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.pending, 1);

        // 次のサイクルで同じレコードが再送される
        let report = h.service.sync_entity(EntityKind::Quotes).await.unwrap();
        assert_eq!(report.pushed, 1);
        assert!(h
            .store
            .get_entity(EntityKind::Quotes, &id)
            .await
            .unwrap()
            .unwrap()
            .synced_at
            .is_some());
    }

    #[tokio::test]
    async fn validation_failure_is_permanent_and_needs_manual_retry() {
        let h = setup(true).await;
        let id = commit_create(&h.store, EntityKind::Charges, "bad").await;
        h.gateway
            .script_push(Err(AppError::ValidationError("422".to_string())));

        let report = h.service.sync_entity(EntityKind::Charges).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(h.store.count_failed().await.unwrap(), 1);

        // failed はデキューされない
        let report = h.service.sync_entity(EntityKind::Charges).await.unwrap();
        assert_eq!(report.pushed, 0);

        assert!(h.store.retry_failed(EntityKind::Charges, &id).await.unwrap());
        let report = h.service.sync_entity(EntityKind::Charges).await.unwrap();
        assert_eq!(report.pushed, 1);
    }

    #[tokio::test]
    async fn unauthorized_halts_engine_and_preserves_queue() {
        let h = setup(true).await;
        commit_create(&h.store, EntityKind::WorkOrders, "1").await;
        commit_create(&h.store, EntityKind::WorkOrders, "2").await;
        h.gateway.script_push(Err(AppError::Unauthorized));

        let err = h.service.sync_entity(EntityKind::WorkOrders).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));

        let status = h.service.status().await;
        assert!(status.auth_required);
        // 両方とも pending のまま、試行回数も消費されない
        assert_eq!(h.store.count_pending().await.unwrap(), 2);
        assert_eq!(h.store.count_failed().await.unwrap(), 0);

        // 停止中は何もしない
        let report = h.service.sync_entity(EntityKind::WorkOrders).await.unwrap();
        assert_eq!(report.pushed, 0);
        assert_eq!(h.gateway.pushed_ids().len(), 1);

        // 再認証後に再開できる
        h.service.clear_auth_required().await;
        let report = h.service.sync_entity(EntityKind::WorkOrders).await.unwrap();
        assert_eq!(report.pushed, 2);
    }

    #[tokio::test]
    async fn pull_applies_remote_entities_and_advances_cursor() {
        let h = setup(true).await;
        let newer = Utc::now();
        let older = newer - Duration::minutes(10);
        h.gateway.script_pull(vec![
            RemoteEntity {
                remote_id: "r-1".to_string(),
                local_id: None,
                payload: json!({ "name": "pulled-1" }),
                updated_at: older,
                deleted: false,
            },
            RemoteEntity {
                remote_id: "r-2".to_string(),
                local_id: None,
                payload: json!({ "name": "pulled-2" }),
                updated_at: newer,
                deleted: false,
            },
        ]);

        let report = h.service.sync_entity(EntityKind::Clients).await.unwrap();
        assert_eq!(report.pulled, 2);

        let cursor = h.store.pull_cursor(EntityKind::Clients).await.unwrap().unwrap();
        assert_eq!(cursor.timestamp_millis(), newer.timestamp_millis());
        assert_eq!(h.store.list_entities(EntityKind::Clients).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn offline_sync_is_a_noop_with_pending_count() {
        let h = setup(false).await;
        commit_create(&h.store, EntityKind::Clients, "offline").await;

        let report = h.service.sync_all().await.unwrap();
        assert_eq!(report.pushed, 0);
        assert_eq!(report.pending, 1);
        assert!(h.gateway.pushed_ids().is_empty());
        assert_eq!(h.service.status().await.state, SyncState::Disabled);
    }

    #[tokio::test]
    async fn offline_sync_entity_reports_disabled() {
        let h = setup(false).await;
        commit_create(&h.store, EntityKind::Quotes, "offline").await;

        let report = h.service.sync_entity(EntityKind::Quotes).await.unwrap();
        assert_eq!(report.pushed, 0);
        assert_eq!(report.pending, 1);
        assert!(h.gateway.pushed_ids().is_empty());
        assert_eq!(h.service.status().await.state, SyncState::Disabled);
    }

    #[tokio::test]
    async fn concurrent_cycles_for_one_kind_coalesce() {
        let h = setup(true).await;
        commit_create(&h.store, EntityKind::Clients, "one").await;
        commit_create(&h.store, EntityKind::Clients, "two").await;

        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        h.gateway.gate_pushes(gate.clone());

        let service = h.service.clone();
        let first = tokio::spawn(async move { service.sync_entity(EntityKind::Clients).await });

        // 最初のサイクルがゲートで止まるまで待つ
        for _ in 0..50 {
            if h.gateway.pushed_ids().len() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(h.gateway.pushed_ids().len(), 1);

        // 同種別のサイクルが走行中なら合流し、何も送らない
        let report = h.service.sync_entity(EntityKind::Clients).await.unwrap();
        assert_eq!(report.pushed, 0);
        assert_eq!(h.gateway.pushed_ids().len(), 1);

        gate.add_permits(2);
        let report = first.await.unwrap().unwrap();
        assert_eq!(report.pushed, 2);

        // 各ミューテーションはちょうど 1 回だけ送られる
        let mut ids = h.gateway.pushed_ids();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 2);
        assert_eq!(h.store.count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn worker_picks_up_nudges_after_reconnect() {
        let h = setup(false).await;
        commit_create(&h.store, EntityKind::Clients, "queued").await;

        let (handle, worker) = h.service.spawn_worker();
        let listener = h.service.spawn_network_listener(handle.clone());

        h.network.set_online(true);

        // ワーカーがキューを掃くのを待つ
        let mut drained = false;
        for _ in 0..50 {
            if h.store.count_pending().await.unwrap() == 0 {
                drained = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(drained, "worker should drain the queue after reconnect");

        listener.abort();
        worker.abort();
    }
}
