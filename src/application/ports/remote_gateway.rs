use crate::domain::entities::{AttachmentRecord, MutationRecord};
use crate::domain::value_objects::EntityKind;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Acknowledgment of one applied mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAck {
    pub remote_id: Option<String>,
}

/// One authoritative entity from the pull endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteEntity {
    pub remote_id: String,
    pub local_id: Option<String>,
    pub payload: Value,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

/// Acknowledgment of one uploaded attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadAck {
    pub id: String,
    pub public_url: String,
}

/// リモート境界の契約。実装はすべての呼び出しに bearer トークンと
/// リクエストタイムアウトを付与し、失敗を次の 3 区分へ正規化する:
/// `AppError::Network`（一時的・再試行）、`AppError::ValidationError`
/// （4xx・恒久的）、`AppError::Unauthorized`（401/403・エンジン停止）。
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Applies one mutation remotely, keyed by the record's stable
    /// `entity_id` so that at-least-once replay cannot duplicate entities.
    async fn push_mutation(&self, record: &MutationRecord) -> Result<RemoteAck, AppError>;

    /// Entities changed since the given watermark.
    async fn pull_since(
        &self,
        kind: EntityKind,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteEntity>, AppError>;

    async fn upload_attachment(&self, record: &AttachmentRecord) -> Result<UploadAck, AppError>;

    async fn delete_attachment(&self, remote_id: &str) -> Result<(), AppError>;
}
