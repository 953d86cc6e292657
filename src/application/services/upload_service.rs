use crate::application::ports::attachment_store::AttachmentStore;
use crate::application::ports::remote_gateway::RemoteGateway;
use crate::domain::entities::{AttachmentDraft, AttachmentRecord};
use crate::domain::value_objects::{AttachmentKind, LocalId};
use crate::infrastructure::media::ImageCompressor;
use crate::shared::error::AppError;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// 1 回の flush の結果。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: u32,
    pub failed: u32,
    pub deleted: u32,
}

/// 添付バイナリの取り込みとアップロードを担当するサービス。
/// 写真は取り込み時に圧縮され、ローカルコピーは同期後も保持される。
pub struct UploadService {
    attachments: Arc<dyn AttachmentStore>,
    gateway: Arc<dyn RemoteGateway>,
    compressor: ImageCompressor,
    max_attempts: u32,
}

impl UploadService {
    pub fn new(
        attachments: Arc<dyn AttachmentStore>,
        gateway: Arc<dyn RemoteGateway>,
        compressor: ImageCompressor,
        max_attempts: u32,
    ) -> Self {
        Self {
            attachments,
            gateway,
            compressor,
            max_attempts,
        }
    }

    /// バイナリを取り込み、pending 状態で永続化する。実際の送信は
    /// 次の flush まで行われないので、オフラインでも成功する。
    pub async fn ingest(&self, draft: AttachmentDraft) -> Result<AttachmentRecord, AppError> {
        let (data, mime_type) = match draft.kind {
            AttachmentKind::Photo => {
                let compressed = self.compressor.compress(draft.data).await?;
                (compressed.data, compressed.mime_type)
            }
            // 署名やその他の小さなバイナリはそのまま
            _ => (draft.data, draft.mime_type),
        };

        let record = AttachmentRecord::new(
            LocalId::generate(),
            draft.owner_id,
            draft.kind,
            mime_type,
            data,
            Utc::now(),
        );
        self.attachments.insert(&record).await?;
        Ok(record)
    }

    pub async fn get(&self, id: &LocalId) -> Result<Option<AttachmentRecord>, AppError> {
        self.attachments.get(id).await
    }

    pub async fn list_for_owner(
        &self,
        owner_id: &LocalId,
    ) -> Result<Vec<AttachmentRecord>, AppError> {
        self.attachments.list_for_owner(owner_id).await
    }

    /// failed になった添付を手動で再試行対象に戻す。
    pub async fn retry(&self, id: &LocalId) -> Result<(), AppError> {
        self.attachments.reset_for_retry(id).await
    }

    /// ユーザー削除。未同期ならその場で破棄し、同期済みなら tombstone を
    /// 立てて次の flush でリモートへカスケードする。
    pub async fn delete(&self, id: &LocalId) -> Result<(), AppError> {
        let record = self
            .attachments
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("attachment not found: {id}")))?;

        if record.remote_id.is_none() {
            self.attachments.remove(id).await
        } else {
            self.attachments.request_delete(id).await
        }
    }

    /// 1 件を即時アップロードする。flush を待たない明示操作。
    pub async fn upload(&self, id: &LocalId) -> Result<(), AppError> {
        let record = self
            .attachments
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("attachment not found: {id}")))?;
        self.upload_one(&record).await
    }

    async fn upload_one(&self, record: &AttachmentRecord) -> Result<(), AppError> {
        self.attachments.mark_uploading(&record.id).await?;
        match self.gateway.upload_attachment(record).await {
            Ok(ack) => {
                self.attachments
                    .mark_synced(&record.id, &ack.id, &ack.public_url, Utc::now())
                    .await?;
                debug!(id = %record.id, remote_id = %ack.id, "attachment uploaded");
                Ok(())
            }
            Err(AppError::Unauthorized) => {
                self.attachments.release_uploading(&record.id).await?;
                Err(AppError::Unauthorized)
            }
            Err(err) => {
                self.attachments
                    .mark_failed(&record.id, &err.to_string())
                    .await?;
                Err(err)
            }
        }
    }

    /// tombstone の削除カスケードと pending/retryable のアップロードを流す。
    /// 401/403 はその場で打ち切り、残りは次のトリガーへ持ち越す。
    pub async fn flush_pending(&self) -> Result<UploadReport, AppError> {
        let mut report = UploadReport::default();

        for tombstone in self.attachments.delete_tombstones().await? {
            if let Some(remote_id) = tombstone.remote_id.as_deref() {
                match self.gateway.delete_attachment(remote_id).await {
                    Ok(()) => {}
                    Err(AppError::Unauthorized) => return Err(AppError::Unauthorized),
                    Err(err) => {
                        warn!(id = %tombstone.id, error = %err, "attachment delete cascade failed");
                        continue;
                    }
                }
            }
            self.attachments.remove(&tombstone.id).await?;
            report.deleted += 1;
        }

        for candidate in self.attachments.upload_candidates(self.max_attempts).await? {
            match self.upload_one(&candidate).await {
                Ok(()) => report.uploaded += 1,
                Err(AppError::Unauthorized) => return Err(AppError::Unauthorized),
                Err(_) => report.failed += 1,
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::remote_gateway::{RemoteAck, RemoteEntity, UploadAck};
    use crate::domain::entities::MutationRecord;
    use crate::domain::value_objects::{EntityKind, UploadStatus};
    use crate::infrastructure::database::Database;
    use crate::infrastructure::sync::SqliteAttachmentStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct TestGateway {
        upload_results: Mutex<VecDeque<Result<UploadAck, AppError>>>,
        deleted_remote_ids: Mutex<Vec<String>>,
    }

    impl TestGateway {
        fn new() -> Self {
            Self {
                upload_results: Mutex::new(VecDeque::new()),
                deleted_remote_ids: Mutex::new(Vec::new()),
            }
        }

        fn script_upload(&self, result: Result<UploadAck, AppError>) {
            self.upload_results.lock().unwrap().push_back(result);
        }
    }

    #[async_trait]
    impl RemoteGateway for TestGateway {
        async fn push_mutation(&self, _record: &MutationRecord) -> Result<RemoteAck, AppError> {
            Ok(RemoteAck::default())
        }

        async fn pull_since(
            &self,
            _kind: EntityKind,
            _since: Option<DateTime<Utc>>,
        ) -> Result<Vec<RemoteEntity>, AppError> {
            Ok(Vec::new())
        }

        async fn upload_attachment(
            &self,
            record: &AttachmentRecord,
        ) -> Result<UploadAck, AppError> {
            self.upload_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(UploadAck {
                        id: format!("remote-{}", record.id),
                        public_url: format!("/uploads/{}.jpg", record.id),
                    })
                })
        }

        async fn delete_attachment(&self, remote_id: &str) -> Result<(), AppError> {
            self.deleted_remote_ids
                .lock()
                .unwrap()
                .push(remote_id.to_string());
            Ok(())
        }
    }

    async fn setup() -> (UploadService, Arc<TestGateway>, Arc<SqliteAttachmentStore>) {
        let pool = Database::in_memory().await.unwrap();
        let attachments = Arc::new(SqliteAttachmentStore::new(pool));
        let gateway = Arc::new(TestGateway::new());
        let service = UploadService::new(
            attachments.clone(),
            gateway.clone(),
            ImageCompressor::new(1600, 75),
            3,
        );
        (service, gateway, attachments)
    }

    fn signature_draft() -> AttachmentDraft {
        AttachmentDraft::new(
            LocalId::generate(),
            AttachmentKind::Signature,
            "image/png".to_string(),
            vec![1, 2, 3, 4],
        )
    }

    #[tokio::test]
    async fn ingest_persists_pending_without_network() {
        let (service, _gateway, _store) = setup().await;

        let record = service.ingest(signature_draft()).await.unwrap();
        assert_eq!(record.sync_status, UploadStatus::Pending);
        // 署名は圧縮を通らない
        assert_eq!(record.data, vec![1, 2, 3, 4]);
        assert_eq!(record.mime_type, "image/png");
    }

    #[tokio::test]
    async fn flush_uploads_candidates_and_marks_synced() {
        let (service, _gateway, _store) = setup().await;
        let record = service.ingest(signature_draft()).await.unwrap();

        let report = service.flush_pending().await.unwrap();
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.failed, 0);

        let stored = service.get(&record.id).await.unwrap().unwrap();
        assert!(stored.is_synced());
        assert!(stored.remote_path.is_some());
    }

    #[tokio::test]
    async fn transient_failure_keeps_local_copy_for_replay() {
        let (service, gateway, _store) = setup().await;
        let record = service.ingest(signature_draft()).await.unwrap();
        gateway.script_upload(Err(AppError::Network("503".to_string())));

        let report = service.flush_pending().await.unwrap();
        assert_eq!(report.failed, 1);

        let stored = service.get(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, UploadStatus::Failed);
        assert_eq!(stored.upload_attempts, 1);
        assert_eq!(stored.data, vec![1, 2, 3, 4]);

        // 次の flush で自動再試行される
        let report = service.flush_pending().await.unwrap();
        assert_eq!(report.uploaded, 1);
    }

    #[tokio::test]
    async fn unauthorized_halts_flush_without_burning_attempts() {
        let (service, gateway, _store) = setup().await;
        let record = service.ingest(signature_draft()).await.unwrap();
        gateway.script_upload(Err(AppError::Unauthorized));

        let err = service.flush_pending().await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));

        let stored = service.get(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, UploadStatus::Pending);
        assert_eq!(stored.upload_attempts, 0);
    }

    #[tokio::test]
    async fn delete_of_synced_attachment_cascades_remotely() {
        let (service, gateway, _store) = setup().await;
        let record = service.ingest(signature_draft()).await.unwrap();
        service.flush_pending().await.unwrap();

        service.delete(&record.id).await.unwrap();
        let report = service.flush_pending().await.unwrap();
        assert_eq!(report.deleted, 1);

        assert!(service.get(&record.id).await.unwrap().is_none());
        let deleted = gateway.deleted_remote_ids.lock().unwrap().clone();
        assert_eq!(deleted, vec![format!("remote-{}", record.id)]);
    }

    #[tokio::test]
    async fn delete_of_unsynced_attachment_is_local_only() {
        let (service, gateway, _store) = setup().await;
        let record = service.ingest(signature_draft()).await.unwrap();

        service.delete(&record.id).await.unwrap();

        assert!(service.get(&record.id).await.unwrap().is_none());
        assert!(gateway.deleted_remote_ids.lock().unwrap().is_empty());
    }
}
