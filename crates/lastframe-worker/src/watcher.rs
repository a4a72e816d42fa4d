//! Ingestion watcher.
//!
//! Turns the container's initial contents and its live additions into
//! candidate items. Each video considered ends in exactly one
//! [`Consideration`]; only `Enqueued` puts work on the queue.

use std::sync::Arc;

use lastframe_media::{AddedNode, AdditionReceiver, DocumentBridge};
use lastframe_models::{derive_identity, ContainerLocator, NodeHandle, ResourceIdentity, VideoResourceDescriptor};
use lastframe_queue::{EnqueueOutcome, PipelineEvent, ProcessingQueue, ProgressChannel};
use lastframe_storage::DedupLedger;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// What happened to one observed video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consideration {
    Enqueued(ResourceIdentity),
    AlreadyProcessed,
    AlreadyQueued,
    NoSource,
    QueueFull,
}

/// Tally of considerations over a scan or an addition batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub seen: usize,
    pub enqueued: usize,
    pub already_processed: usize,
    pub already_queued: usize,
    pub no_source: usize,
    pub queue_full: usize,
}

impl ScanSummary {
    pub fn record(&mut self, consideration: &Consideration) {
        self.seen += 1;
        match consideration {
            Consideration::Enqueued(_) => self.enqueued += 1,
            Consideration::AlreadyProcessed => self.already_processed += 1,
            Consideration::AlreadyQueued => self.already_queued += 1,
            Consideration::NoSource => self.no_source += 1,
            Consideration::QueueFull => self.queue_full += 1,
        }
    }
}

/// A resolved and subscribed container.
pub struct ActiveWatch {
    pub container: NodeHandle,
    pub additions: AdditionReceiver,
}

/// Feeds the processing queue from the document.
#[derive(Clone)]
pub struct IngestionWatcher {
    document: Arc<dyn DocumentBridge>,
    queue: Arc<ProcessingQueue>,
    ledger: DedupLedger,
    events: ProgressChannel,
}

impl IngestionWatcher {
    pub fn new(
        document: Arc<dyn DocumentBridge>,
        queue: Arc<ProcessingQueue>,
        ledger: DedupLedger,
        events: ProgressChannel,
    ) -> Self {
        Self {
            document,
            queue,
            ledger,
            events,
        }
    }

    /// Resolve the container and subscribe to its additions.
    ///
    /// Fails with [`WorkerError::ContainerNotFound`] when the locator does not
    /// resolve. The subscription is taken before any scan so nothing added in
    /// between is missed; duplicates are absorbed by the queue.
    pub async fn activate(&self, locator: &ContainerLocator) -> WorkerResult<ActiveWatch> {
        let container = self
            .document
            .resolve_container(locator)
            .await?
            .ok_or_else(|| WorkerError::container_not_found(locator.as_str()))?;

        let additions = self.document.observe_additions(&container).await?;
        info!(container = %container, locator = %locator, "Watching container");

        Ok(ActiveWatch {
            container,
            additions,
        })
    }

    /// Consider every video currently under `container`.
    pub async fn initial_scan(&self, container: &NodeHandle) -> WorkerResult<ScanSummary> {
        let videos = self.document.video_descendants(container).await?;
        let mut summary = ScanSummary::default();
        for descriptor in videos {
            let consideration = self.consider(descriptor).await;
            summary.record(&consideration);
        }

        info!(
            seen = summary.seen,
            enqueued = summary.enqueued,
            already_processed = summary.already_processed,
            "Initial scan complete"
        );
        Ok(summary)
    }

    /// Consider one batch of added elements.
    ///
    /// An added video counts itself; any other element contributes its video
    /// descendants. Elements that vanished before they could be inspected are
    /// skipped.
    pub async fn handle_additions(&self, batch: Vec<AddedNode>) -> ScanSummary {
        let mut summary = ScanSummary::default();

        for added in batch {
            let videos = match added.as_video() {
                Some(descriptor) => vec![descriptor],
                None => match self.document.video_descendants(&added.node).await {
                    Ok(videos) => videos,
                    Err(e) => {
                        debug!(node = %added.node, "Skipping added element: {}", e);
                        continue;
                    }
                },
            };

            for descriptor in videos {
                let consideration = self.consider(descriptor).await;
                summary.record(&consideration);
            }
        }

        summary
    }

    /// Decide whether one video becomes a queue item.
    pub async fn consider(&self, descriptor: VideoResourceDescriptor) -> Consideration {
        let Some(source) = descriptor.source() else {
            metrics::record_rejected("no_source");
            return Consideration::NoSource;
        };

        let derivation = derive_identity(source);
        if let Some(reason) = &derivation.fallback {
            if reason.is_malformed() {
                warn!(source = %source, "Using raw source as identity: {}", reason);
            }
        }
        let identity = derivation.identity;

        match self.ledger.has(&identity).await {
            Ok(true) => {
                metrics::record_rejected("already_processed");
                return Consideration::AlreadyProcessed;
            }
            Ok(false) => {}
            Err(e) => {
                // The processor re-checks before extracting.
                warn!(identity = %identity, "Ledger lookup failed, enqueueing anyway: {}", e);
            }
        }

        match self.queue.push(descriptor, identity.clone()) {
            EnqueueOutcome::Enqueued(seq) => {
                debug!(identity = %identity, seq, "Enqueued");
                metrics::record_enqueued();
                metrics::set_queue_depth(self.queue.len());
                self.events.publish(PipelineEvent::Enqueued {
                    identity: identity.clone(),
                    seq,
                });
                Consideration::Enqueued(identity)
            }
            EnqueueOutcome::AlreadyQueued => {
                metrics::record_rejected("already_queued");
                Consideration::AlreadyQueued
            }
            EnqueueOutcome::Refreshed => {
                debug!(identity = %identity, "Queued item moved to newer node");
                metrics::record_rejected("already_queued");
                Consideration::AlreadyQueued
            }
            EnqueueOutcome::Full => {
                // Only a new addition or the next session's scan brings it back.
                error!(
                    identity = %identity,
                    capacity = ?self.queue.capacity(),
                    "Queue full, candidate dropped until observed again"
                );
                metrics::record_rejected("queue_full");
                Consideration::QueueFull
            }
        }
    }

    /// Consume addition batches until cancelled or the subscription ends.
    pub async fn run(&self, mut additions: AdditionReceiver, cancel: CancellationToken) {
        loop {
            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                batch = additions.recv() => match batch {
                    Some(batch) => batch,
                    None => {
                        warn!("Addition stream closed");
                        break;
                    }
                },
            };

            let summary = self.handle_additions(batch).await;
            if summary.enqueued > 0 {
                debug!(enqueued = summary.enqueued, seen = summary.seen, "Handled additions");
            }
        }
        debug!("Watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lastframe_media::testing::{FakeDocument, FakeVideo};
    use lastframe_models::{RecordOutcome, SourceScope};

    fn stream_src(hash: &str) -> String {
        format!("stream/%7B%22location%22%3A%7B%22access_hash%22%3A%22{}%22%7D%7D", hash)
    }

    fn watcher(doc: &Arc<FakeDocument>, capacity: Option<usize>) -> IngestionWatcher {
        IngestionWatcher::new(
            doc.clone(),
            Arc::new(ProcessingQueue::new(capacity)),
            DedupLedger::in_memory(SourceScope::default()),
            ProgressChannel::default(),
        )
    }

    #[tokio::test]
    async fn test_missing_container_is_fatal() {
        let doc = Arc::new(FakeDocument::new());
        let err = watcher(&doc, None)
            .activate(&ContainerLocator::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, WorkerError::ContainerNotFound(_)));
        assert_eq!(doc.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_initial_scan_skips_processed() {
        let doc = Arc::new(FakeDocument::new());
        let root = doc.add_container("/c");
        for n in 0..5 {
            doc.insert_video(&root, FakeVideo::new(stream_src(&format!("h{}", n))));
        }
        let w = watcher(&doc, None);
        for n in [1, 3] {
            w.ledger
                .mark_processed(&format!("h{}", n).into(), 0, RecordOutcome::Stored)
                .await
                .unwrap();
        }

        let summary = w.initial_scan(&root).await.unwrap();
        assert_eq!(summary.seen, 5);
        assert_eq!(summary.enqueued, 3);
        assert_eq!(summary.already_processed, 2);
        assert_eq!(w.queue.len(), 3);
    }

    #[tokio::test]
    async fn test_wrapper_addition_contributes_descendants() {
        let doc = Arc::new(FakeDocument::new());
        let root = doc.add_container("/c");
        let w = watcher(&doc, None);
        let mut watch = w.activate(&ContainerLocator::xpath("/c")).await.unwrap();

        doc.append_subtree(
            &root,
            vec![
                FakeVideo::new("blob:1"),
                FakeVideo::without_source(),
                FakeVideo::new("blob:2"),
            ],
        );

        let batch = watch.additions.recv().await.unwrap();
        let summary = w.handle_additions(batch).await;
        assert_eq!(summary.enqueued, 2);
        assert_eq!(summary.no_source, 1);
    }

    #[tokio::test]
    async fn test_same_identity_under_two_nodes_is_queued_once() {
        let doc = Arc::new(FakeDocument::new());
        let root = doc.add_container("/c");
        let w = watcher(&doc, None);

        let a = doc.insert_video(&root, FakeVideo::new(stream_src("same")));
        let b = doc.insert_video(&root, FakeVideo::new(stream_src("same")));

        assert_eq!(
            w.consider(doc.descriptor(&a)).await,
            Consideration::Enqueued("same".into())
        );
        assert_eq!(w.consider(doc.descriptor(&b)).await, Consideration::AlreadyQueued);
    }

    #[tokio::test]
    async fn test_queue_full_is_reported() {
        let doc = Arc::new(FakeDocument::new());
        let root = doc.add_container("/c");
        let w = watcher(&doc, Some(1));
        doc.insert_video(&root, FakeVideo::new("blob:1"));
        doc.insert_video(&root, FakeVideo::new("blob:2"));

        let summary = w.initial_scan(&root).await.unwrap();
        assert_eq!(summary.enqueued, 1);
        assert_eq!(summary.queue_full, 1);
        assert!(!w.queue.contains(&"blob:2".into()));

        let first = w.queue.pop_ready(tokio::time::Instant::now()).unwrap();
        w.ledger
            .mark_processed(&first.identity, 0, RecordOutcome::Stored)
            .await
            .unwrap();
        w.queue.release(&first.identity);

        let rescan = w.initial_scan(&root).await.unwrap();
        assert_eq!(rescan.already_processed, 1);
        assert_eq!(rescan.enqueued, 1);
        assert_eq!(rescan.queue_full, 0);
        assert!(w.queue.contains(&"blob:2".into()));
    }

    #[tokio::test]
    async fn test_malformed_payload_uses_raw_source() {
        let doc = Arc::new(FakeDocument::new());
        let root = doc.add_container("/c");
        let w = watcher(&doc, None);
        let node = doc.insert_video(&root, FakeVideo::new("stream/%7Bbroken"));

        assert_eq!(
            w.consider(doc.descriptor(&node)).await,
            Consideration::Enqueued("stream/%7Bbroken".into())
        );
    }
}
