//! Queue items.

use lastframe_models::{ResourceIdentity, VideoResourceDescriptor};
use tokio::time::Instant;

/// A candidate video waiting for extraction.
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// Insertion sequence number, unique per queue
    pub seq: u64,
    pub descriptor: VideoResourceDescriptor,
    pub identity: ResourceIdentity,
    /// 1 on first attempt
    pub attempt: u32,
    /// Earliest instant the item may be handed out again
    pub not_before: Option<Instant>,
}

impl QueueItem {
    pub fn new(seq: u64, descriptor: VideoResourceDescriptor, identity: ResourceIdentity) -> Self {
        Self {
            seq,
            descriptor,
            identity,
            attempt: 1,
            not_before: None,
        }
    }

    /// Whether the item may be handed out at `now`.
    pub fn is_ready(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |at| at <= now)
    }
}
