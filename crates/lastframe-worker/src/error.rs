//! Worker error types.

use lastframe_media::BridgeError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Session already active")]
    AlreadyActive,

    #[error("Metrics setup failed: {0}")]
    MetricsFailed(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Extraction(#[from] lastframe_media::ExtractionFailure),

    #[error("Storage error: {0}")]
    Storage(#[from] lastframe_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] lastframe_queue::QueueError),

    #[error("Browser error: {0}")]
    Browser(#[from] lastframe_browser::BrowserError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn container_not_found(locator: impl Into<String>) -> Self {
        Self::ContainerNotFound(locator.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Errors that end the session rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WorkerError::ContainerNotFound(_) | WorkerError::ConfigError(_)
        )
    }

    /// Item-level errors worth another attempt on the same node.
    ///
    /// A stale node is not: retrying it can only fail again.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Extraction(failure) => {
                !failure.is_cancelled() && !failure.is_stale_node()
            }
            WorkerError::Bridge(BridgeError::StaleNode(_)) => false,
            WorkerError::Storage(_) | WorkerError::Bridge(_) => true,
            _ => false,
        }
    }
}
