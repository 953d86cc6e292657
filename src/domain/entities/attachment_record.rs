use crate::domain::value_objects::{AttachmentKind, LocalId, UploadStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 写真・署名画像など、オーナーエンティティに紐づくバイナリオブジェクト。
///
/// ローカルコピーはアップロード成功後も保持され、明示的なユーザー削除でのみ
/// 破棄される（同期済みならリモートへもカスケードする）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachmentRecord {
    pub id: LocalId,
    pub owner_id: LocalId,
    pub kind: AttachmentKind,
    pub mime_type: String,
    #[serde(skip_serializing)]
    pub data: Vec<u8>,
    pub remote_id: Option<String>,
    pub remote_path: Option<String>,
    pub sync_status: UploadStatus,
    pub upload_attempts: u32,
    pub last_upload_error: Option<String>,
    pub delete_requested: bool,
    pub created_at: DateTime<Utc>,
}

impl AttachmentRecord {
    pub fn new(
        id: LocalId,
        owner_id: LocalId,
        kind: AttachmentKind,
        mime_type: String,
        data: Vec<u8>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            kind,
            mime_type,
            data,
            remote_id: None,
            remote_path: None,
            sync_status: UploadStatus::Pending,
            upload_attempts: 0,
            last_upload_error: None,
            delete_requested: false,
            created_at,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.sync_status == UploadStatus::Synced
    }
}
