use async_trait::async_trait;
use chrono::{DateTime, Utc};
use genba_sync::application::ports::remote_gateway::{
    RemoteAck, RemoteEntity, RemoteGateway, UploadAck,
};
use genba_sync::shared::config::{AppConfig, DatabaseConfig};
use genba_sync::{
    AppContext, AppError, AttachmentDraft, AttachmentKind, AttachmentRecord, EntityKind,
    MutationPayload, MutationRecord,
};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 記録つきのインメモリゲートウェイ。push はそのまま成功させ、
/// pull は事前に仕込んだエンティティを一度だけ返す。
struct RecordingGateway {
    push_count: AtomicU32,
    pull_entities: Mutex<Vec<RemoteEntity>>,
}

impl RecordingGateway {
    fn new() -> Self {
        Self {
            push_count: AtomicU32::new(0),
            pull_entities: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RemoteGateway for RecordingGateway {
    async fn push_mutation(&self, record: &MutationRecord) -> Result<RemoteAck, AppError> {
        self.push_count.fetch_add(1, Ordering::SeqCst);
        Ok(RemoteAck {
            remote_id: Some(format!("remote-{}", record.entity_id)),
        })
    }

    async fn pull_since(
        &self,
        _kind: EntityKind,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteEntity>, AppError> {
        Ok(std::mem::take(&mut *self.pull_entities.lock().unwrap()))
    }

    async fn upload_attachment(&self, record: &AttachmentRecord) -> Result<UploadAck, AppError> {
        Ok(UploadAck {
            id: format!("att-{}", record.id),
            public_url: format!("/uploads/{}", record.id),
        })
    }

    async fn delete_attachment(&self, _remote_id: &str) -> Result<(), AppError> {
        Ok(())
    }
}

async fn build_context(gateway: Arc<RecordingGateway>) -> (AppContext, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("genba-test.db");
    let config = AppConfig {
        database: DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", db_path.display()),
            ..DatabaseConfig::default()
        },
        ..AppConfig::default()
    };
    let ctx = AppContext::with_gateway(config, gateway).await.unwrap();
    (ctx, dir)
}

async fn wait_until_drained(ctx: &AppContext) -> bool {
    for _ in 0..100 {
        if ctx.pending_count().await.unwrap() == 0 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn offline_writes_drain_automatically_after_reconnect() {
    let gateway = Arc::new(RecordingGateway::new());
    let (ctx, _dir) = build_context(gateway.clone()).await;

    ctx.set_network_online(false);

    let payload = MutationPayload::new(json!({ "name": "Yamada Plumbing" })).unwrap();
    let created = ctx.entities.create(EntityKind::Clients, payload).await.unwrap();

    // オフラインでも即座に読める
    let fetched = ctx
        .entities
        .get(EntityKind::Clients, &created.local_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.payload.as_json()["name"], "Yamada Plumbing");
    assert!(fetched.synced_at.is_none());
    assert_eq!(ctx.pending_count().await.unwrap(), 1);
    assert_eq!(gateway.push_count.load(Ordering::SeqCst), 0);

    // 復帰でワーカーが自動的にキューを掃く
    ctx.set_network_online(true);
    assert!(wait_until_drained(&ctx).await, "queue should drain after reconnect");

    let synced = ctx
        .entities
        .get(EntityKind::Clients, &created.local_id)
        .await
        .unwrap()
        .unwrap();
    assert!(synced.synced_at.is_some());
    assert_eq!(
        synced.remote_id.as_deref(),
        Some(format!("remote-{}", created.local_id).as_str())
    );
    assert_eq!(gateway.push_count.load(Ordering::SeqCst), 1);

    ctx.shutdown().await;
}

#[tokio::test]
async fn manual_sync_pulls_remote_changes_into_local_reads() {
    let gateway = Arc::new(RecordingGateway::new());
    let (ctx, _dir) = build_context(gateway.clone()).await;

    *gateway.pull_entities.lock().unwrap() = vec![RemoteEntity {
        remote_id: "r-100".to_string(),
        local_id: None,
        payload: json!({ "name": "Headquarters sent this" }),
        updated_at: Utc::now(),
        deleted: false,
    }];

    let report = ctx.sync_all().await.unwrap();
    assert_eq!(report.pulled, 1);

    let clients = ctx.entities.list(EntityKind::Clients).await.unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].remote_id.as_deref(), Some("r-100"));

    ctx.shutdown().await;
}

#[tokio::test]
async fn attachments_ride_along_with_full_sync() {
    let gateway = Arc::new(RecordingGateway::new());
    let (ctx, _dir) = build_context(gateway.clone()).await;

    let owner = ctx
        .entities
        .create(
            EntityKind::WorkOrders,
            MutationPayload::new(json!({ "site": "Meguro" })).unwrap(),
        )
        .await
        .unwrap();

    let draft = AttachmentDraft::new(
        owner.local_id.clone(),
        AttachmentKind::Signature,
        "image/png".to_string(),
        vec![9, 9, 9],
    );
    let attachment = ctx.uploads.ingest(draft).await.unwrap();

    ctx.sync_all().await.unwrap();

    let stored = ctx.uploads.get(&attachment.id).await.unwrap().unwrap();
    assert!(stored.is_synced());
    assert_eq!(
        stored.remote_path.as_deref(),
        Some(format!("/uploads/{}", attachment.id).as_str())
    );

    ctx.shutdown().await;
}
