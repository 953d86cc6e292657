use crate::domain::entities::{AttachmentRecord, EntityRecord, MutationRecord};
use crate::domain::value_objects::{
    AttachmentKind, EntityKind, LocalId, MutationOperation, MutationPayload, MutationStatus,
    UploadStatus,
};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EntityRow {
    pub local_id: String,
    pub remote_id: Option<String>,
    pub payload: String,
    pub updated_at: i64,
    pub synced_at: Option<i64>,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MutationRow {
    pub id: i64,
    pub entity_kind: String,
    pub entity_id: String,
    pub operation: String,
    pub payload: String,
    pub status: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub enqueued_at: i64,
    pub updated_at: i64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AttachmentRow {
    pub id: String,
    pub owner_id: String,
    pub kind: String,
    pub mime_type: String,
    pub data: Vec<u8>,
    pub remote_id: Option<String>,
    pub remote_path: Option<String>,
    pub sync_status: String,
    pub upload_attempts: i64,
    pub last_upload_error: Option<String>,
    pub delete_requested: bool,
    pub created_at: i64,
}

pub fn entity_record_from_row(kind: EntityKind, row: EntityRow) -> Result<EntityRecord, AppError> {
    let local_id = LocalId::new(row.local_id).map_err(AppError::ValidationError)?;
    let payload_value: serde_json::Value = serde_json::from_str(&row.payload)
        .map_err(|err| AppError::DeserializationError(err.to_string()))?;
    let payload = MutationPayload::new(payload_value).map_err(AppError::ValidationError)?;

    Ok(EntityRecord {
        entity_kind: kind,
        local_id,
        remote_id: row.remote_id,
        payload,
        updated_at: datetime_from_millis(row.updated_at),
        synced_at: row.synced_at.map(datetime_from_millis),
        is_deleted: row.is_deleted,
    })
}

pub fn mutation_record_from_row(row: MutationRow) -> Result<MutationRecord, AppError> {
    let entity_kind = EntityKind::parse(&row.entity_kind).map_err(AppError::ValidationError)?;
    let entity_id = LocalId::new(row.entity_id).map_err(AppError::ValidationError)?;
    let operation = MutationOperation::parse(&row.operation).map_err(AppError::ValidationError)?;
    let payload_value: serde_json::Value = serde_json::from_str(&row.payload)
        .map_err(|err| AppError::DeserializationError(err.to_string()))?;
    let payload = MutationPayload::new(payload_value).map_err(AppError::ValidationError)?;

    Ok(MutationRecord {
        id: row.id,
        entity_kind,
        entity_id,
        operation,
        payload,
        status: MutationStatus::from(row.status.as_str()),
        attempts: try_i64_to_u32(row.attempts, "attempts")?,
        max_attempts: try_i64_to_u32(row.max_attempts, "max_attempts")?,
        enqueued_at: datetime_from_millis(row.enqueued_at),
        updated_at: datetime_from_millis(row.updated_at),
        last_error: row.last_error,
    })
}

pub fn attachment_record_from_row(row: AttachmentRow) -> Result<AttachmentRecord, AppError> {
    let id = LocalId::new(row.id).map_err(AppError::ValidationError)?;
    let owner_id = LocalId::new(row.owner_id).map_err(AppError::ValidationError)?;

    Ok(AttachmentRecord {
        id,
        owner_id,
        kind: AttachmentKind::from(row.kind.as_str()),
        mime_type: row.mime_type,
        data: row.data,
        remote_id: row.remote_id,
        remote_path: row.remote_path,
        sync_status: UploadStatus::from(row.sync_status.as_str()),
        upload_attempts: try_i64_to_u32(row.upload_attempts, "upload_attempts")?,
        last_upload_error: row.last_upload_error,
        delete_requested: row.delete_requested,
        created_at: datetime_from_millis(row.created_at),
    })
}

pub fn datetime_from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

fn try_i64_to_u32(value: i64, label: &str) -> Result<u32, AppError> {
    value
        .try_into()
        .map_err(|_| AppError::ValidationError(format!("{label} cannot be negative")))
}
