//! Pipeline events via an in-process broadcast channel.

use lastframe_models::ResourceIdentity;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::QueueResult;

/// Something that happened to an item on its way through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Enqueued {
        identity: ResourceIdentity,
        seq: u64,
    },
    Started {
        identity: ResourceIdentity,
        attempt: u32,
    },
    Stored {
        identity: ResourceIdentity,
        location: String,
        elapsed_ms: u64,
    },
    Failed {
        identity: ResourceIdentity,
        /// Extraction stage, or `storing` for output failures
        stage: String,
        error: String,
        will_retry: bool,
    },
    /// Dropped at dequeue because the ledger already had it
    Skipped {
        identity: ResourceIdentity,
    },
}

impl PipelineEvent {
    pub fn identity(&self) -> &ResourceIdentity {
        match self {
            PipelineEvent::Enqueued { identity, .. }
            | PipelineEvent::Started { identity, .. }
            | PipelineEvent::Stored { identity, .. }
            | PipelineEvent::Failed { identity, .. }
            | PipelineEvent::Skipped { identity } => identity,
        }
    }

    pub fn to_json(&self) -> QueueResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Fan-out of pipeline events to any number of subscribers.
///
/// Publishing never blocks and never fails; with no subscribers events are
/// dropped, and slow subscribers see `Lagged`.
#[derive(Clone)]
pub struct ProgressChannel {
    tx: broadcast::Sender<PipelineEvent>,
}

impl ProgressChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: PipelineEvent) {
        trace!(identity = %event.identity(), "Publishing pipeline event");
        let _ = self.tx.send(event);
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let channel = ProgressChannel::default();
        let mut rx = channel.subscribe();

        channel.publish(PipelineEvent::Started {
            identity: "abc123".into(),
            attempt: 1,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.identity().as_str(), "abc123");
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        ProgressChannel::new(4).publish(PipelineEvent::Skipped {
            identity: "x".into(),
        });
    }

    #[test]
    fn test_event_json_shape() {
        let json = PipelineEvent::Failed {
            identity: "abc".into(),
            stage: "seeking".to_string(),
            error: "seek timed out".into(),
            will_retry: true,
        }
        .to_json()
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "failed");
        assert_eq!(value["stage"], "seeking");
        assert_eq!(value["will_retry"], true);
    }
}
