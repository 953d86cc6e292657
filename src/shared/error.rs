use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Database(String),
    Network(String),
    /// 401/403 from the remote. Halts all sync cycles until the host
    /// re-authenticates; queued mutations stay put.
    Unauthorized,
    NotFound(String),
    InvalidInput(String),
    ValidationError(String),
    SerializationError(String),
    DeserializationError(String),
    Media(String),
    Internal(String),
}

impl AppError {
    /// Transient failures are retried by the sync engine; everything else
    /// either surfaces to the caller or flags the record as failed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Network(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::Network(msg) => write!(f, "Network error: {}", msg),
            AppError::Unauthorized => write!(f, "Unauthorized: authentication required"),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppError::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            AppError::Media(msg) => write!(f, "Media error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    // Transport-level failures (timeout, refused connection, DNS) are all
    // transient; HTTP status classification happens at the gateway.
    fn from(err: reqwest::Error) -> Self {
        AppError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Internal(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
