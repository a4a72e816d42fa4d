//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Item is not in flight: {0}")]
    NotInFlight(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueueError {
    pub fn not_in_flight(identity: impl Into<String>) -> Self {
        Self::NotInFlight(identity.into())
    }
}
