//! Monitor session.
//!
//! Owns everything one monitoring run needs: the queue, the ledger and sink
//! handles, both bridges, the cancellation token and the two task handles
//! (watcher and processor). Nothing is global; two sessions never share
//! state unless they are handed the same ledger.

use std::sync::Arc;

use lastframe_media::{DocumentBridge, FrameExtractor, MediaBridge};
use lastframe_models::ContainerLocator;
use lastframe_queue::{PipelineEvent, ProcessingQueue, ProgressChannel};
use lastframe_storage::{DedupLedger, OutputSink};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::processor::QueueProcessor;
use crate::watcher::{IngestionWatcher, ScanSummary};

/// One monitoring run over one container.
pub struct MonitorSession {
    id: String,
    config: PipelineConfig,
    document: Arc<dyn DocumentBridge>,
    media: Arc<dyn MediaBridge>,
    ledger: DedupLedger,
    sink: Arc<dyn OutputSink>,
    queue: Arc<ProcessingQueue>,
    events: ProgressChannel,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorSession {
    pub fn new(
        config: PipelineConfig,
        document: Arc<dyn DocumentBridge>,
        media: Arc<dyn MediaBridge>,
        ledger: DedupLedger,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        let queue = Arc::new(ProcessingQueue::new(config.queue_capacity));
        Self {
            id: format!("session-{}", Uuid::new_v4()),
            config,
            document,
            media,
            ledger,
            sink,
            queue,
            events: ProgressChannel::default(),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn queue(&self) -> &Arc<ProcessingQueue> {
        &self.queue
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Token cancelled on shutdown; cancel it to stop the session.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_active(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Start monitoring the container at `locator`.
    ///
    /// Resolves the container, subscribes to additions, runs the initial scan
    /// and spawns the watcher and processor. A missing container is fatal and
    /// leaves the session inactive.
    pub async fn activate(&mut self, locator: &ContainerLocator) -> WorkerResult<ScanSummary> {
        if self.is_active() {
            return Err(WorkerError::AlreadyActive);
        }

        let watcher = IngestionWatcher::new(
            self.document.clone(),
            self.queue.clone(),
            self.ledger.clone(),
            self.events.clone(),
        );

        let watch = match watcher.activate(locator).await {
            Ok(watch) => watch,
            Err(e) => {
                error!(session_id = %self.id, locator = %locator, "Activation failed: {}", e);
                return Err(e);
            }
        };
        let summary = watcher.initial_scan(&watch.container).await?;

        let extractor = FrameExtractor::new(self.media.clone(), self.config.extractor.clone());
        let processor = QueueProcessor::new(
            self.id.clone(),
            self.queue.clone(),
            self.ledger.clone(),
            self.sink.clone(),
            extractor,
            self.events.clone(),
            &self.config,
        );

        let cancel = self.cancel.clone();
        let additions = watch.additions;
        self.tasks.push(tokio::spawn(async move {
            watcher.run(additions, cancel).await;
        }));

        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            processor.run(cancel).await;
        }));

        info!(
            session_id = %self.id,
            locator = %locator,
            scope = %self.ledger.scope(),
            ledger = self.ledger.backend(),
            sink = self.sink.backend(),
            enqueued = summary.enqueued,
            "Session active"
        );
        Ok(summary)
    }

    /// Wait until the session's tasks end on their own or are cancelled.
    pub async fn wait(&mut self) -> WorkerResult<()> {
        let mut failure = None;
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                failure.get_or_insert_with(|| WorkerError::TaskFailed(e.to_string()));
            }
        }
        failure.map_or(Ok(()), Err)
    }

    /// Cancel all work and wait for the tasks to finish.
    ///
    /// An item interrupted mid-extraction is not recorded, so the next
    /// session's initial scan picks it up again.
    pub async fn shutdown(mut self) -> WorkerResult<()> {
        info!(session_id = %self.id, queued = self.queue.len(), "Shutting down session");
        self.cancel.cancel();
        self.wait().await
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
