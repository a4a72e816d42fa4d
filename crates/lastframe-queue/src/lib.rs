//! Single-lane processing queue.
//!
//! This crate provides:
//! - The FIFO queue of candidate items with per-identity presence tracking
//! - Deferred retries (not-before instants) and an optional capacity bound
//! - Pipeline events broadcast to in-process subscribers

pub mod error;
pub mod item;
pub mod progress;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use item::QueueItem;
pub use progress::{PipelineEvent, ProgressChannel};
pub use queue::{EnqueueOutcome, ProcessingQueue};
