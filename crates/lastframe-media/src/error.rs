//! Error types for media operations.

use std::time::Duration;

use lastframe_models::ExtractionStage;
use thiserror::Error;

use crate::bridge::BridgeError;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while extracting a frame.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Bridge call failed: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Media did not become ready within {0:?}")]
    ReadyTimeout(Duration),

    #[error("Seek did not settle within {0:?}")]
    SeekTimeout(Duration),

    #[error("Bridge call timed out after {0:?}")]
    CallTimeout(Duration),

    #[error("Media reports no usable duration: {0}")]
    InvalidDuration(String),

    #[error("Snapshot is empty ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },

    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl MediaError {
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MediaError::Cancelled)
    }

    /// Whether the page dropped the video element mid-extraction.
    pub fn is_stale_node(&self) -> bool {
        matches!(self, MediaError::Bridge(BridgeError::StaleNode(_)))
    }
}

/// A failed extraction, tagged with the stage it failed in.
#[derive(Debug, Error)]
#[error("extraction failed while {stage}: {error}")]
pub struct ExtractionFailure {
    pub stage: ExtractionStage,
    #[source]
    pub error: MediaError,
}

impl ExtractionFailure {
    pub fn new(stage: ExtractionStage, error: MediaError) -> Self {
        Self { stage, error }
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.is_cancelled()
    }

    pub fn is_stale_node(&self) -> bool {
        self.error.is_stale_node()
    }
}
