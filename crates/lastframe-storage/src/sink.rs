//! Output sinks for captured frames.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use lastframe_models::{CapturedFrame, ResourceIdentity};
use tracing::info;

use crate::client::R2Client;
use crate::error::{StorageError, StorageResult};
use crate::fs_utils::write_atomic;
use crate::naming::frame_object_name;

/// Where a frame ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFrame {
    pub identity: ResourceIdentity,
    /// Path or object key of the written image
    pub location: String,
    pub bytes: usize,
}

/// Durable destination for captured frames.
///
/// Names are derived from the identity alone, so storing the same identity
/// twice overwrites rather than duplicates.
#[async_trait]
pub trait OutputSink: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn store(&self, frame: &CapturedFrame) -> StorageResult<StoredFrame>;
}

/// Writes frames into a local directory.
pub struct FsSink {
    dir: PathBuf,
}

impl FsSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the frame for `identity` is written to.
    pub fn path_for(&self, identity: &ResourceIdentity) -> PathBuf {
        self.dir.join(frame_object_name(identity))
    }
}

#[async_trait]
impl OutputSink for FsSink {
    fn backend(&self) -> &'static str {
        "fs"
    }

    async fn store(&self, frame: &CapturedFrame) -> StorageResult<StoredFrame> {
        if frame.is_empty() {
            return Err(StorageError::write_failed("refusing to write an empty frame"));
        }

        let path = self.path_for(&frame.identity);
        write_atomic(&path, &frame.png).await?;

        info!(identity = %frame.identity, path = %path.display(), "Stored frame");
        Ok(StoredFrame {
            identity: frame.identity.clone(),
            location: path.display().to_string(),
            bytes: frame.len(),
        })
    }
}

/// Uploads frames to an R2 bucket under a key prefix.
pub struct R2Sink {
    client: R2Client,
    prefix: String,
}

impl R2Sink {
    pub fn new(client: R2Client, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    /// Object key for `identity`.
    pub fn key_for(&self, identity: &ResourceIdentity) -> String {
        let name = frame_object_name(identity);
        if self.prefix.is_empty() {
            name
        } else {
            format!("{}/{}", self.prefix, name)
        }
    }
}

#[async_trait]
impl OutputSink for R2Sink {
    fn backend(&self) -> &'static str {
        "r2"
    }

    async fn store(&self, frame: &CapturedFrame) -> StorageResult<StoredFrame> {
        if frame.is_empty() {
            return Err(StorageError::upload_failed("refusing to upload an empty frame"));
        }

        let key = self.key_for(&frame.identity);
        self.client.put_frame(&key, frame).await?;

        info!(identity = %frame.identity, bucket = %self.client.bucket(), key = %key, "Uploaded frame");
        Ok(StoredFrame {
            identity: frame.identity.clone(),
            location: key,
            bytes: frame.len(),
        })
    }
}

/// Keeps frames in memory; for ephemeral runs and tests.
#[derive(Default)]
pub struct MemorySink {
    frames: Mutex<Vec<CapturedFrame>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every frame written so far, in write order.
    pub fn frames(&self) -> Vec<CapturedFrame> {
        self.frames
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    /// Number of writes for `identity`.
    pub fn writes_for(&self, identity: &ResourceIdentity) -> usize {
        self.frames()
            .iter()
            .filter(|f| &f.identity == identity)
            .count()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn store(&self, frame: &CapturedFrame) -> StorageResult<StoredFrame> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::write_failed("sink unavailable"));
        }

        let mut frames = self
            .frames
            .lock()
            .map_err(|_| StorageError::write_failed("sink lock poisoned"))?;
        frames.push(frame.clone());

        Ok(StoredFrame {
            identity: frame.identity.clone(),
            location: frame_object_name(&frame.identity),
            bytes: frame.len(),
        })
    }
}
