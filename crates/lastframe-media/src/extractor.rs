//! Per-item last-frame extraction.
//!
//! One call to [`FrameExtractor::extract`] walks a single video through
//! `AwaitingReady → Seeking → Capturing → Encoding → Done`. Every wait is
//! bounded and every suspension point observes the cancellation token, so a
//! bad item costs at most its timeouts. There are no retries here; the caller
//! decides what a failure means.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lastframe_models::{CapturedFrame, ExtractionStage, NodeHandle, ResourceIdentity, VideoResourceDescriptor};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bridge::{BridgeResult, MediaBridge, PixelBuffer};
use crate::encode::encode_png;
use crate::error::{ExtractionFailure, MediaError, MediaResult};

/// Timeouts applied by the extractor.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Bound on waiting for the media to reach the `loadeddata` threshold
    pub ready_timeout: Duration,
    /// Bound on waiting for the seek to the end to settle
    pub seek_timeout: Duration,
    /// Bound on any single non-waiting bridge call
    pub call_timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(30),
            seek_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Drives a video element to its last frame and captures it.
pub struct FrameExtractor {
    media: Arc<dyn MediaBridge>,
    config: ExtractorConfig,
}

impl FrameExtractor {
    pub fn new(media: Arc<dyn MediaBridge>, config: ExtractorConfig) -> Self {
        Self { media, config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract the last frame of `descriptor`.
    ///
    /// On failure the returned error carries the stage that failed. A
    /// cancelled extraction reports [`MediaError::Cancelled`].
    pub async fn extract(
        &self,
        descriptor: &VideoResourceDescriptor,
        identity: &ResourceIdentity,
        cancel: &CancellationToken,
    ) -> Result<CapturedFrame, ExtractionFailure> {
        let started = Instant::now();
        let mut stage = ExtractionStage::Pending;

        let result = self.run(&descriptor.node, identity, cancel, &mut stage).await;
        match result {
            Ok(frame) => {
                debug!(
                    identity = %identity,
                    width = frame.width,
                    height = frame.height,
                    bytes = frame.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Captured last frame"
                );
                Ok(frame)
            }
            Err(error) => {
                let failed_in = stage;
                debug_assert!(failed_in.can_fail(), "failed before extraction started");
                stage = ExtractionStage::Failed;
                debug!(identity = %identity, from = %failed_in, to = %stage, "Extraction stage");
                Err(ExtractionFailure::new(failed_in, error))
            }
        }
    }

    async fn run(
        &self,
        node: &NodeHandle,
        identity: &ResourceIdentity,
        cancel: &CancellationToken,
        stage: &mut ExtractionStage,
    ) -> MediaResult<CapturedFrame> {
        advance(stage, identity);
        self.pause(node, identity, cancel).await?;

        let state = self.call(cancel, self.media.ready_state(node)).await?;
        if !state.can_render() {
            let limit = self.config.ready_timeout;
            let ready = bounded(
                cancel,
                limit + self.config.call_timeout,
                MediaError::ReadyTimeout(limit),
                self.media.wait_until_ready(node, limit),
            )
            .await?;
            if !ready {
                return Err(MediaError::ReadyTimeout(limit));
            }
        }

        advance(stage, identity);
        self.pause(node, identity, cancel).await?;

        let position = match self.call(cancel, self.media.duration(node)).await? {
            Some(d) if d.is_finite() && d > 0.0 => d,
            Some(d) => return Err(MediaError::InvalidDuration(d.to_string())),
            None => return Err(MediaError::InvalidDuration("not a number".to_string())),
        };

        let limit = self.config.seek_timeout;
        let settled = bounded(
            cancel,
            limit + self.config.call_timeout,
            MediaError::SeekTimeout(limit),
            self.media.seek_and_settle(node, position, limit),
        )
        .await?;
        if !settled {
            return Err(MediaError::SeekTimeout(limit));
        }

        advance(stage, identity);
        let (width, height) = self.call(cancel, self.media.natural_size(node)).await?;
        let pixels = if width == 0 || height == 0 {
            // Nothing to draw; encoding reports the empty frame.
            PixelBuffer::new(width, height, Vec::new())
        } else {
            self.call(cancel, self.media.snapshot(node, width, height))
                .await?
        };

        advance(stage, identity);
        let (width, height) = (pixels.width, pixels.height);
        let png = encode_png(pixels)?;

        advance(stage, identity);
        Ok(CapturedFrame {
            identity: identity.clone(),
            png,
            width,
            height,
        })
    }

    /// Pause playback. Only cancellation is fatal here; a stale node will
    /// surface on the next call anyway.
    async fn pause(
        &self,
        node: &NodeHandle,
        identity: &ResourceIdentity,
        cancel: &CancellationToken,
    ) -> MediaResult<()> {
        match self.call(cancel, self.media.pause(node)).await {
            Ok(()) => Ok(()),
            Err(MediaError::Cancelled) => Err(MediaError::Cancelled),
            Err(e) => {
                warn!(identity = %identity, "Failed to pause video: {}", e);
                Ok(())
            }
        }
    }

    async fn call<T, F>(&self, cancel: &CancellationToken, fut: F) -> MediaResult<T>
    where
        F: Future<Output = BridgeResult<T>>,
    {
        let limit = self.config.call_timeout;
        bounded(cancel, limit, MediaError::CallTimeout(limit), fut).await
    }
}

/// Move to the next stage on the success path.
fn advance(stage: &mut ExtractionStage, identity: &ResourceIdentity) {
    if let Some(next) = stage.next() {
        debug!(identity = %identity, from = %stage, to = %next, "Extraction stage");
        *stage = next;
    }
}

/// Await a bridge future, giving up on cancellation or after `limit`.
///
/// For page-side waits `limit` is a backstop; the page resolves first.
async fn bounded<T, F>(
    cancel: &CancellationToken,
    limit: Duration,
    on_timeout: MediaError,
    fut: F,
) -> MediaResult<T>
where
    F: Future<Output = BridgeResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MediaError::Cancelled),
        result = tokio::time::timeout(limit, fut) => match result {
            Ok(inner) => inner.map_err(MediaError::from),
            Err(_) => Err(on_timeout),
        },
    }
}
