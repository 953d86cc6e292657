use crate::domain::value_objects::{
    EntityKind, LocalId, MutationOperation, MutationPayload, MutationStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 1 件のリモートエンティティに対する永続化済みの書き込み意図。
///
/// 不変条件: 同一 `(entity_kind, entity_id)` につき in-flight は常に 1 件以下、
/// 適用順序はキー単位で FIFO。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MutationRecord {
    pub id: i64,
    pub entity_kind: EntityKind,
    pub entity_id: LocalId,
    pub operation: MutationOperation,
    pub payload: MutationPayload,
    pub status: MutationStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl MutationRecord {
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}
