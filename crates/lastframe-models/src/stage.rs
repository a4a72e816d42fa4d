//! Extraction stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of the per-item extraction state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStage {
    /// Dequeued, nothing done yet
    #[default]
    Pending,
    /// Playback paused, waiting for the media to report readiness
    AwaitingReady,
    /// Position set to the duration, waiting for the seek to settle
    Seeking,
    /// Snapshotting the current frame
    Capturing,
    /// Serializing the snapshot
    Encoding,
    /// Frame produced
    Done,
    /// Gave up on the item
    Failed,
}

impl ExtractionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStage::Pending => "pending",
            ExtractionStage::AwaitingReady => "awaiting_ready",
            ExtractionStage::Seeking => "seeking",
            ExtractionStage::Capturing => "capturing",
            ExtractionStage::Encoding => "encoding",
            ExtractionStage::Done => "done",
            ExtractionStage::Failed => "failed",
        }
    }

    /// The stage that follows on success, if any.
    pub fn next(&self) -> Option<ExtractionStage> {
        match self {
            ExtractionStage::Pending => Some(ExtractionStage::AwaitingReady),
            ExtractionStage::AwaitingReady => Some(ExtractionStage::Seeking),
            ExtractionStage::Seeking => Some(ExtractionStage::Capturing),
            ExtractionStage::Capturing => Some(ExtractionStage::Encoding),
            ExtractionStage::Encoding => Some(ExtractionStage::Done),
            ExtractionStage::Done | ExtractionStage::Failed => None,
        }
    }

    /// Whether an item in this stage may transition to `Failed`.
    pub fn can_fail(&self) -> bool {
        matches!(
            self,
            ExtractionStage::AwaitingReady
                | ExtractionStage::Seeking
                | ExtractionStage::Capturing
                | ExtractionStage::Encoding
        )
    }
}

impl fmt::Display for ExtractionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
