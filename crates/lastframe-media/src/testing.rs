//! In-process fake document for tests.
//!
//! [`FakeDocument`] implements both bridge traits over a small in-memory tree.
//! Videos are configured with [`FakeVideo`] (readiness, duration, size, seek
//! behaviour) and every media call is recorded so tests can assert on what
//! the pipeline did to each node.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lastframe_models::{ContainerLocator, NodeHandle, VideoResourceDescriptor};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::bridge::{
    AddedNode, AdditionReceiver, BridgeError, BridgeResult, DocumentBridge, MediaBridge,
    PixelBuffer, ReadyState,
};

/// When a fake video reaches the `loadeddata` threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Readiness {
    Ready,
    After(Duration),
    Never,
}

/// Configuration of one fake `<video>` element.
#[derive(Debug, Clone)]
pub struct FakeVideo {
    pub src: Option<String>,
    pub readiness: Readiness,
    pub duration: Option<f64>,
    pub width: u32,
    pub height: u32,
    pub seek_settles: bool,
    pub snapshot_fails: bool,
    pub pixel: [u8; 4],
}

impl FakeVideo {
    /// A ready 4x3 video, 12.5 s long.
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: Some(src.into()),
            ..Self::without_source()
        }
    }

    pub fn without_source() -> Self {
        Self {
            src: None,
            readiness: Readiness::Ready,
            duration: Some(12.5),
            width: 4,
            height: 3,
            seek_settles: true,
            snapshot_fails: false,
            pixel: [32, 64, 128, 255],
        }
    }

    pub fn ready_after(mut self, delay: Duration) -> Self {
        self.readiness = Readiness::After(delay);
        self
    }

    pub fn never_ready(mut self) -> Self {
        self.readiness = Readiness::Never;
        self
    }

    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn seek_never_settles(mut self) -> Self {
        self.seek_settles = false;
        self
    }

    pub fn snapshot_fails(mut self) -> Self {
        self.snapshot_fails = true;
        self
    }
}

/// A media call made against a node.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaCall {
    Pause,
    ReadyState,
    /// Carries the page-side limit
    WaitUntilReady(Duration),
    Duration,
    Seek(f64),
    NaturalSize,
    Snapshot,
}

#[derive(Debug)]
struct FakeNode {
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
    video: Option<FakeVideo>,
    ready_at: Option<Instant>,
    attached: bool,
}

#[derive(Default)]
struct FakeDom {
    next_id: u64,
    nodes: HashMap<NodeHandle, FakeNode>,
    containers: HashMap<String, NodeHandle>,
    observers: Vec<(NodeHandle, mpsc::UnboundedSender<Vec<AddedNode>>)>,
    calls: Vec<(NodeHandle, MediaCall)>,
}

impl FakeDom {
    fn create(&mut self, parent: Option<&NodeHandle>, video: Option<FakeVideo>) -> NodeHandle {
        self.next_id += 1;
        let handle = NodeHandle(format!("node-{}", self.next_id));
        let ready_at = video.as_ref().and_then(|v| match v.readiness {
            Readiness::Ready => Some(Instant::now()),
            Readiness::After(delay) => Some(Instant::now() + delay),
            Readiness::Never => None,
        });

        self.nodes.insert(
            handle.clone(),
            FakeNode {
                parent: parent.cloned(),
                children: Vec::new(),
                video,
                ready_at,
                attached: true,
            },
        );
        if let Some(parent) = parent {
            if let Some(p) = self.nodes.get_mut(parent) {
                p.children.push(handle.clone());
            }
        }
        handle
    }

    fn attached(&self, node: &NodeHandle) -> BridgeResult<&FakeNode> {
        self.nodes
            .get(node)
            .filter(|n| n.attached)
            .ok_or_else(|| BridgeError::StaleNode(node.clone()))
    }

    fn video(&mut self, node: &NodeHandle, call: MediaCall) -> BridgeResult<(FakeVideo, Option<Instant>)> {
        self.calls.push((node.clone(), call));
        let entry = self.attached(node)?;
        let video = entry
            .video
            .clone()
            .ok_or_else(|| BridgeError::script("not a video element"))?;
        Ok((video, entry.ready_at))
    }

    fn is_within(&self, node: &NodeHandle, ancestor: &NodeHandle) -> bool {
        let mut current = Some(node.clone());
        while let Some(n) = current {
            if &n == ancestor {
                return true;
            }
            current = self.nodes.get(&n).and_then(|e| e.parent.clone());
        }
        false
    }

    fn collect_videos(&self, root: &NodeHandle, out: &mut Vec<VideoResourceDescriptor>) {
        let Some(entry) = self.nodes.get(root) else {
            return;
        };
        for child in &entry.children {
            if let Some(c) = self.nodes.get(child).filter(|c| c.attached) {
                if let Some(video) = &c.video {
                    out.push(VideoResourceDescriptor::new(child.clone(), video.src.clone()));
                }
                self.collect_videos(child, out);
            }
        }
    }

    fn added_node(&self, node: &NodeHandle) -> Option<AddedNode> {
        self.nodes.get(node).map(|entry| AddedNode {
            node: node.clone(),
            is_video: entry.video.is_some(),
            raw_source: entry.video.as_ref().and_then(|v| v.src.clone()),
        })
    }

    fn notify(&mut self, node: &NodeHandle) {
        let Some(added) = self.added_node(node) else {
            return;
        };
        let targets: Vec<bool> = self
            .observers
            .iter()
            .map(|(container, _)| self.is_within(node, container) && node != container)
            .collect();

        let mut index = 0;
        self.observers.retain(|(_, tx)| {
            let keep = !targets[index] || tx.send(vec![added.clone()]).is_ok();
            index += 1;
            keep
        });
    }
}

/// In-memory document implementing [`DocumentBridge`] and [`MediaBridge`].
#[derive(Default)]
pub struct FakeDocument {
    dom: Mutex<FakeDom>,
}

impl FakeDocument {
    pub fn new() -> Self {
        Self::default()
    }

    fn dom(&self) -> std::sync::MutexGuard<'_, FakeDom> {
        self.dom.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a container element reachable at `xpath`.
    pub fn add_container(&self, xpath: &str) -> NodeHandle {
        let mut dom = self.dom();
        let handle = dom.create(None, None);
        dom.containers.insert(xpath.to_string(), handle.clone());
        handle
    }

    /// Insert a plain element without notifying observers.
    pub fn insert_element(&self, parent: &NodeHandle) -> NodeHandle {
        self.dom().create(Some(parent), None)
    }

    /// Insert a video without notifying observers (present before activation).
    pub fn insert_video(&self, parent: &NodeHandle, video: FakeVideo) -> NodeHandle {
        self.dom().create(Some(parent), Some(video))
    }

    /// Append a video and report it as an addition.
    pub fn append_video(&self, parent: &NodeHandle, video: FakeVideo) -> NodeHandle {
        let mut dom = self.dom();
        let handle = dom.create(Some(parent), Some(video));
        dom.notify(&handle);
        handle
    }

    /// Append a wrapper element holding `videos` and report only the wrapper
    /// as added. Returns the wrapper and the video handles.
    pub fn append_subtree(
        &self,
        parent: &NodeHandle,
        videos: Vec<FakeVideo>,
    ) -> (NodeHandle, Vec<NodeHandle>) {
        let mut dom = self.dom();
        let wrapper = dom.create(Some(parent), None);
        let children = videos
            .into_iter()
            .map(|v| dom.create(Some(&wrapper), Some(v)))
            .collect();
        dom.notify(&wrapper);
        (wrapper, children)
    }

    /// Report an existing node as added again.
    pub fn renotify(&self, node: &NodeHandle) {
        self.dom().notify(node);
    }

    /// Remove a node and its subtree from the document.
    pub fn detach(&self, node: &NodeHandle) {
        let mut dom = self.dom();
        let mut stack = vec![node.clone()];
        while let Some(n) = stack.pop() {
            if let Some(entry) = dom.nodes.get_mut(&n) {
                entry.attached = false;
                stack.extend(entry.children.iter().cloned());
            }
        }
    }

    /// Descriptor for an existing video node.
    pub fn descriptor(&self, node: &NodeHandle) -> VideoResourceDescriptor {
        let dom = self.dom();
        let src = dom
            .nodes
            .get(node)
            .and_then(|n| n.video.as_ref())
            .and_then(|v| v.src.clone());
        VideoResourceDescriptor::new(node.clone(), src)
    }

    /// Media calls made against one node, in order.
    pub fn calls_for(&self, node: &NodeHandle) -> Vec<MediaCall> {
        self.dom()
            .calls
            .iter()
            .filter(|(n, _)| n == node)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Nodes that were snapshotted, in order.
    pub fn snapshots(&self) -> Vec<NodeHandle> {
        self.dom()
            .calls
            .iter()
            .filter(|(_, c)| *c == MediaCall::Snapshot)
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn pause_count(&self, node: &NodeHandle) -> usize {
        self.calls_for(node)
            .iter()
            .filter(|c| **c == MediaCall::Pause)
            .count()
    }

    pub fn observer_count(&self) -> usize {
        self.dom().observers.len()
    }
}

#[async_trait]
impl DocumentBridge for FakeDocument {
    async fn resolve_container(
        &self,
        locator: &ContainerLocator,
    ) -> BridgeResult<Option<NodeHandle>> {
        let dom = self.dom();
        Ok(dom
            .containers
            .get(locator.as_str())
            .filter(|h| dom.attached(h).is_ok())
            .cloned())
    }

    async fn video_descendants(
        &self,
        root: &NodeHandle,
    ) -> BridgeResult<Vec<VideoResourceDescriptor>> {
        let dom = self.dom();
        dom.attached(root)?;
        let mut out = Vec::new();
        dom.collect_videos(root, &mut out);
        Ok(out)
    }

    async fn observe_additions(&self, container: &NodeHandle) -> BridgeResult<AdditionReceiver> {
        let mut dom = self.dom();
        dom.attached(container)?;
        let (tx, rx) = mpsc::unbounded_channel();
        dom.observers.push((container.clone(), tx));
        Ok(rx)
    }
}

#[async_trait]
impl MediaBridge for FakeDocument {
    async fn pause(&self, node: &NodeHandle) -> BridgeResult<()> {
        self.dom().video(node, MediaCall::Pause).map(|_| ())
    }

    async fn ready_state(&self, node: &NodeHandle) -> BridgeResult<ReadyState> {
        let (_, ready_at) = self.dom().video(node, MediaCall::ReadyState)?;
        Ok(match ready_at {
            Some(at) if Instant::now() >= at => ReadyState::HaveEnoughData,
            _ => ReadyState::HaveMetadata,
        })
    }

    async fn wait_until_ready(&self, node: &NodeHandle, limit: Duration) -> BridgeResult<bool> {
        let (_, ready_at) = self.dom().video(node, MediaCall::WaitUntilReady(limit))?;
        let deadline = Instant::now() + limit;
        match ready_at {
            Some(at) if at <= deadline => {
                tokio::time::sleep_until(at).await;
                Ok(true)
            }
            _ => {
                tokio::time::sleep_until(deadline).await;
                Ok(false)
            }
        }
    }

    async fn duration(&self, node: &NodeHandle) -> BridgeResult<Option<f64>> {
        let (video, _) = self.dom().video(node, MediaCall::Duration)?;
        Ok(video.duration)
    }

    async fn seek_and_settle(
        &self,
        node: &NodeHandle,
        position: f64,
        limit: Duration,
    ) -> BridgeResult<bool> {
        let (video, _) = self.dom().video(node, MediaCall::Seek(position))?;
        if !video.seek_settles {
            tokio::time::sleep(limit).await;
        }
        Ok(video.seek_settles)
    }

    async fn natural_size(&self, node: &NodeHandle) -> BridgeResult<(u32, u32)> {
        let (video, _) = self.dom().video(node, MediaCall::NaturalSize)?;
        Ok((video.width, video.height))
    }

    async fn snapshot(
        &self,
        node: &NodeHandle,
        width: u32,
        height: u32,
    ) -> BridgeResult<PixelBuffer> {
        let (video, _) = self.dom().video(node, MediaCall::Snapshot)?;
        if video.snapshot_fails {
            return Err(BridgeError::script("canvas snapshot failed"));
        }
        Ok(PixelBuffer::solid(width, height, video.pixel))
    }
}
