//! Bridge traits to the host document.
//!
//! The pipeline never touches the browser directly. Everything it needs from
//! the page goes through these two traits: [`DocumentBridge`] for structure
//! (locating the container, enumerating videos, subtree additions) and
//! [`MediaBridge`] for driving a single video element.
//!
//! Node handles are non-owning. Any call may fail with
//! [`BridgeError::StaleNode`] once the page has dropped the element.

use std::time::Duration;

use async_trait::async_trait;
use lastframe_models::{ContainerLocator, NodeHandle, VideoResourceDescriptor};
use thiserror::Error;
use tokio::sync::mpsc;

/// Result type for bridge calls.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors reported by a bridge implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("Node is no longer attached: {0}")]
    StaleNode(NodeHandle),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected response: {0}")]
    Protocol(String),
}

impl BridgeError {
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

/// `HTMLMediaElement.readyState` levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

impl ReadyState {
    /// Map a raw `readyState` value; anything above 4 saturates.
    pub fn from_raw(value: u64) -> Self {
        match value {
            0 => ReadyState::HaveNothing,
            1 => ReadyState::HaveMetadata,
            2 => ReadyState::HaveCurrentData,
            3 => ReadyState::HaveFutureData,
            _ => ReadyState::HaveEnoughData,
        }
    }

    /// Whether the current frame can be rendered (the `loadeddata` threshold).
    pub fn can_render(self) -> bool {
        self >= ReadyState::HaveCurrentData
    }
}

/// An element added somewhere under the watched container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedNode {
    /// Handle to the added element
    pub node: NodeHandle,
    /// Whether the element itself is a `<video>`
    pub is_video: bool,
    /// The element's `src` attribute when it is a video
    pub raw_source: Option<String>,
}

impl AddedNode {
    /// Descriptor for the node itself, if it is a video.
    pub fn as_video(&self) -> Option<VideoResourceDescriptor> {
        self.is_video
            .then(|| VideoResourceDescriptor::new(self.node.clone(), self.raw_source.clone()))
    }
}

/// Receiving end of a subtree-addition subscription.
///
/// Each message is one batch of additions. The subscription ends when the
/// sender side is dropped.
pub type AdditionReceiver = mpsc::UnboundedReceiver<Vec<AddedNode>>;

/// Raw RGBA pixels of one captured frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8 samples
    pub rgba: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self { width, height, rgba }
    }

    /// A buffer of the given size filled with one colour.
    pub fn solid(width: u32, height: u32, pixel: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut rgba = Vec::with_capacity(count * 4);
        for _ in 0..count {
            rgba.extend_from_slice(&pixel);
        }
        Self { width, height, rgba }
    }

    /// Byte length a well-formed buffer of this size must have.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Structural access to the host document.
#[async_trait]
pub trait DocumentBridge: Send + Sync {
    /// Resolve a structural path to the container node, if present.
    async fn resolve_container(&self, locator: &ContainerLocator)
        -> BridgeResult<Option<NodeHandle>>;

    /// All `<video>` descendants of `root` (excluding `root` itself), in
    /// document order, with their current `src`.
    async fn video_descendants(&self, root: &NodeHandle)
        -> BridgeResult<Vec<VideoResourceDescriptor>>;

    /// Subscribe to element additions anywhere in the container's subtree.
    async fn observe_additions(&self, container: &NodeHandle) -> BridgeResult<AdditionReceiver>;
}

/// Control over a single video element.
#[async_trait]
pub trait MediaBridge: Send + Sync {
    /// Pause playback.
    async fn pause(&self, node: &NodeHandle) -> BridgeResult<()>;

    /// Current readiness level.
    async fn ready_state(&self, node: &NodeHandle) -> BridgeResult<ReadyState>;

    /// Wait for the element to signal it has current data (`loadeddata`).
    ///
    /// The page side gives up after `limit` and the call resolves `false`, so
    /// no listener outlives the wait. Callers still bound the call itself.
    async fn wait_until_ready(&self, node: &NodeHandle, limit: Duration) -> BridgeResult<bool>;

    /// Reported duration in seconds; `None` when not a finite number.
    async fn duration(&self, node: &NodeHandle) -> BridgeResult<Option<f64>>;

    /// Set the playback position and wait for the seek to settle (`seeked`).
    ///
    /// Resolves `false` when the page-side `limit` elapses first.
    async fn seek_and_settle(
        &self,
        node: &NodeHandle,
        position: f64,
        limit: Duration,
    ) -> BridgeResult<bool>;

    /// Intrinsic pixel size (`videoWidth`, `videoHeight`).
    async fn natural_size(&self, node: &NodeHandle) -> BridgeResult<(u32, u32)>;

    /// Snapshot the currently displayed frame at the given size.
    async fn snapshot(&self, node: &NodeHandle, width: u32, height: u32)
        -> BridgeResult<PixelBuffer>;
}
