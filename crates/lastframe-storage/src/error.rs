//! Ledger and sink errors.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage misconfigured: {0}")]
    ConfigError(String),

    /// The ledger file exists but does not parse. It is never replaced.
    #[error("Corrupt ledger {0}")]
    CorruptLedger(String),

    #[error("Frame upload failed: {0}")]
    UploadFailed(String),

    #[error("Frame write failed: {0}")]
    WriteFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("R2 error: {0}")]
    AwsSdk(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn corrupt_ledger(msg: impl Into<String>) -> Self {
        Self::CorruptLedger(msg.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn write_failed(msg: impl Into<String>) -> Self {
        Self::WriteFailed(msg.into())
    }
}
