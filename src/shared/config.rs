use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Per-request timeout in seconds. Mandatory so a sync cycle can never
    /// hang on a dead connection.
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    /// Periodic sync interval in seconds, used when `auto_sync` is enabled.
    pub sync_interval: u64,
    /// Retry ceiling for a queued mutation before it is flagged `failed`
    /// and left for manual retry.
    pub max_retry: u32,
    pub batch_size: u32,
    /// Capacity of the bounded work queue feeding the sync worker.
    pub queue_capacity: usize,
    /// Applied queue entries older than this many hours are purged at the
    /// end of a full sync cycle.
    pub retain_applied_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Longest edge an uploaded image is resized to before encoding.
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    /// Upload attempts the engine makes on its own; beyond this only an
    /// explicit user retry resubmits the attachment.
    pub max_attempts: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://genba.db?mode=rwc".to_string(),
            max_connections: 5,
            connection_timeout: 30,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            request_timeout: 30,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: false,
            sync_interval: 300,
            max_retry: 5,
            batch_size: 20,
            queue_capacity: 64,
            retain_applied_hours: 24,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1600,
            jpeg_quality: 75,
            max_attempts: 3,
        }
    }
}
