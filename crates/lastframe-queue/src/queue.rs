//! The processing queue.
//!
//! FIFO over candidate items with one slot per identity. An identity counts
//! as present from the moment it is enqueued until the processor releases it,
//! including while it is being extracted, so duplicate notifications that
//! arrive mid-extraction are rejected. A duplicate that brings a different
//! node replaces the node of the waiting item, since the page may have
//! re-rendered the video and dropped the old element. All critical sections
//! are short and synchronous; nothing here awaits.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use lastframe_models::{ResourceIdentity, VideoResourceDescriptor};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{QueueError, QueueResult};
use crate::item::QueueItem;

/// Result of offering an item to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Accepted with this sequence number
    Enqueued(u64),
    /// The identity is already queued or in flight
    AlreadyQueued,
    /// The identity is already present; the item now points at the new node
    Refreshed,
    /// The capacity bound was reached
    Full,
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<QueueItem>,
    present: HashSet<ResourceIdentity>,
    in_flight: HashSet<ResourceIdentity>,
    /// Newer nodes seen for in-flight identities
    refreshed: HashMap<ResourceIdentity, VideoResourceDescriptor>,
    next_seq: u64,
}

impl QueueState {
    fn refresh(
        &mut self,
        descriptor: VideoResourceDescriptor,
        identity: ResourceIdentity,
    ) -> EnqueueOutcome {
        if let Some(item) = self.items.iter_mut().find(|item| item.identity == identity) {
            if item.descriptor.node == descriptor.node {
                return EnqueueOutcome::AlreadyQueued;
            }
            debug!(identity = %identity, node = %descriptor.node, "Queued item moved to newer node");
            item.descriptor = descriptor;
            return EnqueueOutcome::Refreshed;
        }

        if self.in_flight.contains(&identity) {
            let same_node = self
                .refreshed
                .get(&identity)
                .map_or(false, |d| d.node == descriptor.node);
            if !same_node {
                self.refreshed.insert(identity, descriptor);
                return EnqueueOutcome::Refreshed;
            }
        }
        EnqueueOutcome::AlreadyQueued
    }
}

/// Single-consumer FIFO of candidate items.
pub struct ProcessingQueue {
    state: Mutex<QueueState>,
    capacity: Option<usize>,
}

impl ProcessingQueue {
    /// Create a queue; `None` means unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            capacity,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Append an item unless its identity is already present.
    ///
    /// For a present identity, a descriptor on a different node replaces the
    /// waiting item's node. If the item is in flight the node is kept for
    /// [`requeue`](Self::requeue) and [`replace_stale`](Self::replace_stale).
    pub fn push(
        &self,
        descriptor: VideoResourceDescriptor,
        identity: ResourceIdentity,
    ) -> EnqueueOutcome {
        let mut state = self.state();

        if state.present.contains(&identity) {
            return state.refresh(descriptor, identity);
        }
        if let Some(capacity) = self.capacity {
            if state.items.len() >= capacity {
                return EnqueueOutcome::Full;
            }
        }

        state.next_seq += 1;
        let seq = state.next_seq;
        state.present.insert(identity.clone());
        state.items.push_back(QueueItem::new(seq, descriptor, identity));

        EnqueueOutcome::Enqueued(seq)
    }

    /// Take the oldest item that is ready at `now`.
    ///
    /// Items deferred for a retry are skipped until their not-before instant
    /// passes; they never block fresh items behind them. The taken identity
    /// stays present (in flight) until [`release`](Self::release) or
    /// [`requeue`](Self::requeue).
    pub fn pop_ready(&self, now: Instant) -> Option<QueueItem> {
        let mut state = self.state();
        let index = state.items.iter().position(|item| item.is_ready(now))?;
        let item = state.items.remove(index)?;
        state.in_flight.insert(item.identity.clone());
        Some(item)
    }

    /// Put an in-flight item back at the tail for another attempt.
    ///
    /// Picks up a newer node seen while the item was in flight.
    pub fn requeue(&self, mut item: QueueItem, delay: Duration) -> QueueResult<u32> {
        let mut state = self.state();
        if !state.in_flight.remove(&item.identity) {
            return Err(QueueError::not_in_flight(item.identity.as_str()));
        }
        if let Some(fresh) = state.refreshed.remove(&item.identity) {
            item.descriptor = fresh;
        }

        item.attempt += 1;
        item.not_before = Some(Instant::now() + delay);
        let attempt = item.attempt;

        debug!(
            identity = %item.identity,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Requeued item"
        );
        state.items.push_back(item);
        Ok(attempt)
    }

    /// Hand an item whose node left the document back to the queue.
    ///
    /// If a newer node for the same identity arrived while the item was in
    /// flight, the item goes back to the head of the queue on that node,
    /// keeping its attempt count, and `true` is returned. Otherwise the
    /// identity is released so the next observation enqueues it again.
    pub fn replace_stale(&self, mut item: QueueItem) -> QueueResult<bool> {
        let mut state = self.state();
        if !state.in_flight.remove(&item.identity) {
            return Err(QueueError::not_in_flight(item.identity.as_str()));
        }

        match state.refreshed.remove(&item.identity) {
            Some(fresh) => {
                debug!(identity = %item.identity, node = %fresh.node, "Resuming on newer node");
                item.descriptor = fresh;
                item.not_before = None;
                state.items.push_front(item);
                Ok(true)
            }
            None => {
                state.present.remove(&item.identity);
                Ok(false)
            }
        }
    }

    /// Forget an in-flight identity once it has been fully handled.
    pub fn release(&self, identity: &ResourceIdentity) -> bool {
        let mut state = self.state();
        let was_in_flight = state.in_flight.remove(identity);
        if was_in_flight {
            state.present.remove(identity);
            state.refreshed.remove(identity);
        }
        was_in_flight
    }

    /// Whether `identity` is queued or in flight.
    pub fn contains(&self, identity: &ResourceIdentity) -> bool {
        self.state().present.contains(identity)
    }

    /// Number of queued items, excluding the one in flight.
    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.state().in_flight.len()
    }

    /// Time until the earliest deferred item becomes ready, if nothing is
    /// ready now.
    pub fn next_ready_in(&self, now: Instant) -> Option<Duration> {
        let state = self.state();
        if state.items.iter().any(|item| item.is_ready(now)) {
            return Some(Duration::ZERO);
        }
        state
            .items
            .iter()
            .filter_map(|item| item.not_before)
            .min()
            .map(|at| at.saturating_duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lastframe_models::NodeHandle;

    fn candidate(n: usize) -> (VideoResourceDescriptor, ResourceIdentity) {
        let descriptor = VideoResourceDescriptor::new(
            NodeHandle::from_string(format!("node-{}", n)),
            Some(format!("blob:{}", n)),
        );
        (descriptor, ResourceIdentity::from(format!("id-{}", n)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_order() {
        let queue = ProcessingQueue::unbounded();
        for n in 0..6 {
            let (d, id) = candidate(n);
            assert!(matches!(queue.push(d, id), EnqueueOutcome::Enqueued(_)));
        }

        let mut order = Vec::new();
        while let Some(item) = queue.pop_ready(Instant::now()) {
            queue.release(&item.identity);
            order.push(item.identity.0);
        }

        let expected: Vec<_> = (0..6).map(|n| format!("id-{}", n)).collect();
        assert_eq!(order, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_identity_rejected_while_queued_and_in_flight() {
        let queue = ProcessingQueue::unbounded();
        let (d, id) = candidate(1);

        assert!(matches!(queue.push(d.clone(), id.clone()), EnqueueOutcome::Enqueued(_)));
        assert_eq!(queue.push(d.clone(), id.clone()), EnqueueOutcome::AlreadyQueued);

        let item = queue.pop_ready(Instant::now()).unwrap();
        assert_eq!(queue.push(d.clone(), id.clone()), EnqueueOutcome::AlreadyQueued);

        assert!(queue.release(&item.identity));
        assert!(matches!(queue.push(d, id), EnqueueOutcome::Enqueued(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_bound() {
        let queue = ProcessingQueue::new(Some(2));
        for n in 0..2 {
            let (d, id) = candidate(n);
            queue.push(d, id);
        }
        let (d, id) = candidate(2);
        assert_eq!(queue.push(d, id), EnqueueOutcome::Full);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_retry_does_not_block_fresh_items() {
        let queue = ProcessingQueue::unbounded();
        let (d, id) = candidate(1);
        queue.push(d, id);

        let first = queue.pop_ready(Instant::now()).unwrap();
        assert_eq!(queue.requeue(first, Duration::from_secs(5)).unwrap(), 2);

        let (d, id) = candidate(2);
        queue.push(d, id);

        let next = queue.pop_ready(Instant::now()).unwrap();
        assert_eq!(next.identity.as_str(), "id-2");
        queue.release(&next.identity);

        assert!(queue.pop_ready(Instant::now()).is_none());
        assert_eq!(
            queue.next_ready_in(Instant::now()),
            Some(Duration::from_secs(5))
        );

        tokio::time::advance(Duration::from_secs(5)).await;
        let retried = queue.pop_ready(Instant::now()).unwrap();
        assert_eq!(retried.identity.as_str(), "id-1");
        assert_eq!(retried.attempt, 2);
    }

    fn on_node(n: usize, node: &str) -> VideoResourceDescriptor {
        VideoResourceDescriptor::new(
            NodeHandle::from_string(node),
            Some(format!("blob:{}", n)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_on_new_node_refreshes_queued_item() {
        let queue = ProcessingQueue::unbounded();
        let (d, id) = candidate(1);
        queue.push(d, id.clone());

        assert_eq!(
            queue.push(on_node(1, "node-1b"), id.clone()),
            EnqueueOutcome::Refreshed
        );
        assert_eq!(queue.len(), 1);

        let item = queue.pop_ready(Instant::now()).unwrap();
        assert_eq!(item.descriptor.node.as_str(), "node-1b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshed_while_in_flight_resumes_on_new_node() {
        let queue = ProcessingQueue::unbounded();
        let (d, id) = candidate(1);
        queue.push(d, id.clone());
        let item = queue.pop_ready(Instant::now()).unwrap();

        assert_eq!(
            queue.push(on_node(1, "node-1b"), id.clone()),
            EnqueueOutcome::Refreshed
        );
        assert_eq!(
            queue.push(on_node(1, "node-1b"), id.clone()),
            EnqueueOutcome::AlreadyQueued
        );

        assert!(queue.replace_stale(item).unwrap());
        let resumed = queue.pop_ready(Instant::now()).unwrap();
        assert_eq!(resumed.descriptor.node.as_str(), "node-1b");
        assert_eq!(resumed.attempt, 1);
        assert!(queue.release(&resumed.identity));
        assert!(!queue.contains(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_item_without_new_node_is_released() {
        let queue = ProcessingQueue::unbounded();
        let (d, id) = candidate(1);
        queue.push(d.clone(), id.clone());
        let item = queue.pop_ready(Instant::now()).unwrap();

        assert!(!queue.replace_stale(item).unwrap());
        assert!(!queue.contains(&id));
        assert!(queue.is_empty());
        assert!(matches!(queue.push(d, id), EnqueueOutcome::Enqueued(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_picks_up_new_node() {
        let queue = ProcessingQueue::unbounded();
        let (d, id) = candidate(1);
        queue.push(d, id.clone());
        let item = queue.pop_ready(Instant::now()).unwrap();

        queue.push(on_node(1, "node-1b"), id);
        queue.requeue(item, Duration::ZERO).unwrap();
        let retried = queue.pop_ready(Instant::now()).unwrap();
        assert_eq!(retried.descriptor.node.as_str(), "node-1b");
        assert_eq!(retried.attempt, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_requires_in_flight() {
        let queue = ProcessingQueue::unbounded();
        let (d, id) = candidate(1);
        let item = QueueItem::new(99, d, id);
        assert!(matches!(
            queue.requeue(item, Duration::ZERO),
            Err(QueueError::NotInFlight(_))
        ));
    }
}
