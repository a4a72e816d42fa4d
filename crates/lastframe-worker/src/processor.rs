//! Queue processor.
//!
//! The single consumer of the processing queue. One item at a time: re-check
//! the ledger, extract the last frame, store it, record it, then cool down.
//! Failures go through the configured [`FailurePolicy`]; only a stored frame
//! or a final give-up writes the ledger. Cancellation never does, and neither
//! does a video element the page dropped mid-extraction: that item resumes on
//! a newer node for the same identity, or waits to be observed again.

use std::sync::Arc;
use std::time::Duration;

use lastframe_media::FrameExtractor;
use lastframe_models::RecordOutcome;
use lastframe_queue::{PipelineEvent, ProcessingQueue, ProgressChannel, QueueItem};
use lastframe_storage::{DedupLedger, OutputSink};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

use crate::config::PipelineConfig;
use crate::error::WorkerError;
use crate::logging::ItemLogger;
use crate::metrics;
use crate::retry::{decide, FailureAction, FailurePolicy, RetryConfig};

/// Stage label used for output failures.
const STORING_STAGE: &str = "storing";

/// How one dequeued item ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Frame written and recorded
    Stored { location: String },
    /// Already in the ledger at dequeue
    Skipped,
    /// Failed and put back for another attempt
    Retrying { attempt: u32, delay: Duration },
    /// Failed and recorded as failed
    Failed { stage: String },
    /// The node left the document; `requeued` when a newer node took over
    Detached { requeued: bool },
    /// Interrupted by session shutdown
    Cancelled,
}

/// Single-consumer loop over the processing queue.
pub struct QueueProcessor {
    session_id: String,
    queue: Arc<ProcessingQueue>,
    ledger: DedupLedger,
    sink: Arc<dyn OutputSink>,
    extractor: FrameExtractor,
    events: ProgressChannel,
    cooldown: Duration,
    poll_interval: Duration,
    policy: FailurePolicy,
    retry: RetryConfig,
}

impl QueueProcessor {
    pub fn new(
        session_id: impl Into<String>,
        queue: Arc<ProcessingQueue>,
        ledger: DedupLedger,
        sink: Arc<dyn OutputSink>,
        extractor: FrameExtractor,
        events: ProgressChannel,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            queue,
            ledger,
            sink,
            extractor,
            events,
            cooldown: config.cooldown,
            poll_interval: config.poll_interval,
            policy: config.failure_policy,
            retry: config.retry.clone(),
        }
    }

    /// Process items until cancelled.
    ///
    /// Sleeps `cooldown` after every item that did work and `poll_interval`
    /// whenever nothing is ready.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            session_id = %self.session_id,
            cooldown_ms = self.cooldown.as_millis() as u64,
            policy = %self.policy,
            "Processor started"
        );

        while !cancel.is_cancelled() {
            let pause = match self.process_next(&cancel).await {
                Some(ItemOutcome::Skipped) => Duration::ZERO,
                Some(ItemOutcome::Cancelled) => break,
                Some(_) => self.cooldown,
                None => self.poll_interval,
            };

            if pause.is_zero() {
                continue;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        debug!(session_id = %self.session_id, "Processor stopped");
    }

    /// Handle the oldest ready item, if any.
    pub async fn process_next(&self, cancel: &CancellationToken) -> Option<ItemOutcome> {
        let item = self.queue.pop_ready(Instant::now())?;
        metrics::set_queue_depth(self.queue.len());

        let logger = ItemLogger::new(&self.session_id, &item.identity, item.attempt);
        let span = logger.create_span();
        Some(self.handle(item, &logger, cancel).instrument(span).await)
    }

    async fn handle(
        &self,
        item: QueueItem,
        logger: &ItemLogger,
        cancel: &CancellationToken,
    ) -> ItemOutcome {
        match self.ledger.has(&item.identity).await {
            Ok(true) => {
                debug!(identity = %item.identity, "Already recorded, skipping");
                self.queue.release(&item.identity);
                self.events.publish(PipelineEvent::Skipped {
                    identity: item.identity.clone(),
                });
                return ItemOutcome::Skipped;
            }
            Ok(false) => {}
            Err(e) => logger.log_warning(&format!("ledger lookup failed: {}", e)),
        }

        logger.log_start(&format!("seq {}", item.seq));
        self.events.publish(PipelineEvent::Started {
            identity: item.identity.clone(),
            attempt: item.attempt,
        });

        let started = Instant::now();
        let frame = match self
            .extractor
            .extract(&item.descriptor, &item.identity, cancel)
            .await
        {
            Ok(frame) => frame,
            Err(failure) if failure.is_cancelled() => {
                debug!(identity = %item.identity, "Extraction cancelled");
                self.queue.release(&item.identity);
                return ItemOutcome::Cancelled;
            }
            Err(failure) if failure.is_stale_node() => {
                return self.detached(item, logger, failure.stage.to_string(), failure.to_string());
            }
            Err(failure) => {
                let stage = failure.stage.to_string();
                return self
                    .fail(item, logger, stage, WorkerError::from(failure))
                    .await;
            }
        };
        metrics::record_extraction_duration(started.elapsed());

        let stored = match self.sink.store(&frame).await {
            Ok(stored) => stored,
            Err(e) => {
                return self
                    .fail(item, logger, STORING_STAGE.to_string(), WorkerError::from(e))
                    .await
            }
        };
        drop(frame);

        if let Err(e) = self.ledger.mark_now(&item.identity, RecordOutcome::Stored).await {
            // The frame is safe; a later session may store it again under the
            // same name.
            logger.log_warning(&format!("failed to record stored frame: {}", e));
        }
        self.queue.release(&item.identity);

        metrics::record_stored(self.sink.backend());
        logger.log_completion(&format!("{} bytes to {}", stored.bytes, stored.location));
        self.events.publish(PipelineEvent::Stored {
            identity: item.identity.clone(),
            location: stored.location.clone(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });

        ItemOutcome::Stored {
            location: stored.location,
        }
    }

    async fn fail(
        &self,
        item: QueueItem,
        logger: &ItemLogger,
        stage: String,
        error: WorkerError,
    ) -> ItemOutcome {
        logger.log_error(&stage, &error.to_string());
        metrics::record_failure(&stage);

        let action = decide(self.policy, &self.retry, item.attempt, error.is_retryable());
        let identity = item.identity.clone();

        let outcome = match action {
            FailureAction::Requeue(delay) => match self.queue.requeue(item, delay) {
                Ok(attempt) => {
                    metrics::record_retry();
                    ItemOutcome::Retrying { attempt, delay }
                }
                Err(e) => {
                    logger.log_warning(&format!("requeue failed: {}", e));
                    self.give_up(&identity, logger, &stage).await
                }
            },
            FailureAction::GiveUp => self.give_up(&identity, logger, &stage).await,
        };

        self.events.publish(PipelineEvent::Failed {
            identity,
            stage,
            error: error.to_string(),
            will_retry: matches!(outcome, ItemOutcome::Retrying { .. }),
        });
        outcome
    }

    fn detached(
        &self,
        item: QueueItem,
        logger: &ItemLogger,
        stage: String,
        error: String,
    ) -> ItemOutcome {
        let identity = item.identity.clone();
        let requeued = match self.queue.replace_stale(item) {
            Ok(requeued) => requeued,
            Err(e) => {
                logger.log_warning(&format!("failed to hand back detached item: {}", e));
                self.queue.release(&identity);
                false
            }
        };
        logger.log_warning(&format!(
            "node detached while {}, {}",
            stage,
            if requeued { "resuming on newer node" } else { "waiting for it to reappear" }
        ));
        metrics::record_failure(&stage);

        self.events.publish(PipelineEvent::Failed {
            identity,
            stage,
            error,
            will_retry: requeued,
        });
        ItemOutcome::Detached { requeued }
    }

    async fn give_up(
        &self,
        identity: &lastframe_models::ResourceIdentity,
        logger: &ItemLogger,
        stage: &str,
    ) -> ItemOutcome {
        if let Err(e) = self.ledger.mark_now(identity, RecordOutcome::Failed).await {
            logger.log_warning(&format!("failed to record failure: {}", e));
        }
        self.queue.release(identity);
        ItemOutcome::Failed {
            stage: stage.to_string(),
        }
    }
}
