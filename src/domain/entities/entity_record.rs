use crate::domain::value_objects::{EntityKind, LocalId, MutationPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// ドメインエンティティの行と同期メタデータ。種別ごとに同一スキーマのテーブルを持つ。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityRecord {
    pub entity_kind: EntityKind,
    pub local_id: LocalId,
    pub remote_id: Option<String>,
    pub payload: MutationPayload,
    pub updated_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

impl EntityRecord {
    /// `synced_at` が未設定、または最終ローカル更新より古い場合は未同期。
    pub fn has_unsynced_changes(&self) -> bool {
        match self.synced_at {
            None => true,
            Some(synced_at) => synced_at < self.updated_at,
        }
    }
}
