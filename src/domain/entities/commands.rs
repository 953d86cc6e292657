use crate::domain::value_objects::{
    AttachmentKind, EntityKind, LocalId, MutationOperation, MutationPayload,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// ローカルコミットと同期キュー投入を 1 トランザクションで行う書き込みドラフト。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityWrite {
    pub kind: EntityKind,
    pub local_id: LocalId,
    pub operation: MutationOperation,
    pub payload: MutationPayload,
}

impl EntityWrite {
    pub fn create(kind: EntityKind, local_id: LocalId, payload: MutationPayload) -> Self {
        Self {
            kind,
            local_id,
            operation: MutationOperation::Create,
            payload,
        }
    }

    pub fn update(kind: EntityKind, local_id: LocalId, payload: MutationPayload) -> Self {
        Self {
            kind,
            local_id,
            operation: MutationOperation::Update,
            payload,
        }
    }

    pub fn delete(kind: EntityKind, local_id: LocalId) -> Self {
        // Deletes ship the idempotency key only.
        let payload = MutationPayload::new(json!({ "localId": local_id.as_str() }))
            .unwrap_or_else(|_| unreachable!("object literal is always a valid payload"));
        Self {
            kind,
            local_id,
            operation: MutationOperation::Delete,
            payload,
        }
    }
}

/// 添付バイナリを取り込む際のドラフト。
#[derive(Debug, Clone)]
pub struct AttachmentDraft {
    pub owner_id: LocalId,
    pub kind: AttachmentKind,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl AttachmentDraft {
    pub fn new(owner_id: LocalId, kind: AttachmentKind, mime_type: String, data: Vec<u8>) -> Self {
        Self {
            owner_id,
            kind,
            mime_type,
            data,
        }
    }
}
