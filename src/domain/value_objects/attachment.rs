use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentKind {
    Photo,
    Signature,
    Unknown(String),
}

impl AttachmentKind {
    pub fn as_str(&self) -> &str {
        match self {
            AttachmentKind::Photo => "photo",
            AttachmentKind::Signature => "signature",
            AttachmentKind::Unknown(value) => value.as_str(),
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for AttachmentKind {
    fn from(value: &str) -> Self {
        match value {
            "photo" => AttachmentKind::Photo,
            "signature" => AttachmentKind::Signature,
            other => AttachmentKind::Unknown(other.to_string()),
        }
    }
}

/// バイナリアップロードの状態機械。メタデータ同期キューとは独立。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    Pending,
    Uploading,
    Synced,
    Failed,
    Unknown(String),
}

impl UploadStatus {
    pub fn as_str(&self) -> &str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Synced => "synced",
            UploadStatus::Failed => "failed",
            UploadStatus::Unknown(value) => value.as_str(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Synced)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for UploadStatus {
    fn from(value: &str) -> Self {
        match value {
            "pending" => UploadStatus::Pending,
            "uploading" => UploadStatus::Uploading,
            "synced" => UploadStatus::Synced,
            "failed" => UploadStatus::Failed,
            other => UploadStatus::Unknown(other.to_string()),
        }
    }
}
