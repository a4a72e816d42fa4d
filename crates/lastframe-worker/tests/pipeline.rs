//! End-to-end pipeline tests over the in-process fake document.
//!
//! Time is paused, so readiness timeouts, retry delays and cooldowns run
//! instantly while keeping their ordering.

use std::sync::Arc;
use std::time::Duration;

use lastframe_media::testing::{FakeDocument, FakeVideo};
use lastframe_models::{ContainerLocator, RecordOutcome, ResourceIdentity, SourceScope};
use lastframe_queue::PipelineEvent;
use lastframe_storage::{DedupLedger, MemorySink};
use lastframe_worker::backends::open_ledger;
use lastframe_worker::{
    FailurePolicy, LedgerBackend, MonitorSession, PipelineConfig, RetryConfig, WorkerError,
};
use tempfile::TempDir;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;

const CONTAINER: &str = "/html/body/div[1]/div/div[2]";

fn stream_src(hash: &str) -> String {
    let payload = format!(
        r#"{{"dcId":2,"location":{{"_":"inputDocumentFileLocation","access_hash":"{}"}},"size":2048}}"#,
        hash
    );
    format!("stream/{}", urlencoding::encode(&payload))
}

fn locator() -> ContainerLocator {
    ContainerLocator::xpath(CONTAINER)
}

struct Harness {
    doc: Arc<FakeDocument>,
    sink: Arc<MemorySink>,
    ledger: DedupLedger,
    session: MonitorSession,
    events: broadcast::Receiver<PipelineEvent>,
}

impl Harness {
    fn new(config: PipelineConfig) -> Self {
        Self::with_ledger(config, DedupLedger::in_memory(SourceScope::default()))
    }

    fn with_ledger(config: PipelineConfig, ledger: DedupLedger) -> Self {
        let doc = Arc::new(FakeDocument::new());
        let sink = Arc::new(MemorySink::new());
        let session = MonitorSession::new(
            config,
            doc.clone(),
            doc.clone(),
            ledger.clone(),
            sink.clone(),
        );
        let events = session.subscribe();
        Self {
            doc,
            sink,
            ledger,
            session,
            events,
        }
    }

    /// Wait for the next event matching `pred`.
    async fn until(&mut self, pred: impl Fn(&PipelineEvent) -> bool) -> PipelineEvent {
        let wait = async {
            loop {
                match self.events.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => panic!("event channel closed"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(3600), wait)
            .await
            .expect("timed out waiting for pipeline event")
    }

    async fn next_stored(&mut self) -> ResourceIdentity {
        match self
            .until(|e| matches!(e, PipelineEvent::Stored { .. }))
            .await
        {
            PipelineEvent::Stored { identity, .. } => identity,
            _ => unreachable!(),
        }
    }

    async fn outcome_of(&self, identity: &str) -> Option<RecordOutcome> {
        self.ledger
            .get(&identity.into())
            .await
            .unwrap()
            .map(|record| record.outcome)
    }
}

fn is_final(event: &PipelineEvent) -> bool {
    matches!(
        event,
        PipelineEvent::Stored { .. } | PipelineEvent::Failed { will_retry: false, .. }
    )
}

#[tokio::test(start_paused = true)]
async fn test_stream_video_is_captured_and_recorded() {
    let mut h = Harness::new(PipelineConfig::default());
    let root = h.doc.add_container(CONTAINER);
    let node = h.doc.insert_video(&root, FakeVideo::new(stream_src("abc123")));

    let summary = h.session.activate(&locator()).await.unwrap();
    assert_eq!(summary.enqueued, 1);

    assert_eq!(h.next_stored().await.as_str(), "abc123");
    assert_eq!(h.outcome_of("abc123").await, Some(RecordOutcome::Stored));

    let frames = h.sink.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].identity.as_str(), "abc123");
    assert_eq!((frames[0].width, frames[0].height), (4, 3));
    assert_eq!(&frames[0].png[1..4], b"PNG");
    // Paused on dequeue and again before seeking.
    assert_eq!(h.doc.pause_count(&node), 2);

    h.session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_renotified_node_is_not_processed_twice() {
    let mut h = Harness::new(PipelineConfig::default());
    let root = h.doc.add_container(CONTAINER);
    let node = h.doc.insert_video(&root, FakeVideo::new(stream_src("abc123")));
    h.session.activate(&locator()).await.unwrap();
    h.doc.renotify(&node);
    h.doc.renotify(&node);
    h.next_stored().await;

    h.doc.renotify(&node);
    h.doc.append_video(&root, FakeVideo::new(stream_src("next")));
    assert_eq!(h.next_stored().await.as_str(), "next");

    assert_eq!(h.sink.writes_for(&"abc123".into()), 1);
    assert_eq!(h.ledger.len().await.unwrap(), 2);

    h.session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_same_identity_under_two_nodes_is_queued_once() {
    let mut h = Harness::new(PipelineConfig::default());
    let root = h.doc.add_container(CONTAINER);
    h.doc.insert_video(&root, FakeVideo::new(stream_src("shared")));
    h.doc.insert_video(&root, FakeVideo::new(stream_src("shared")));

    let summary = h.session.activate(&locator()).await.unwrap();
    assert_eq!(summary.enqueued, 1);
    assert_eq!(summary.already_queued, 1);

    h.next_stored().await;
    assert_eq!(h.doc.snapshots().len(), 1);

    h.session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_rerendered_video_is_captured_from_new_node() {
    let mut h = Harness::new(PipelineConfig::default());
    let root = h.doc.add_container(CONTAINER);
    let src = stream_src("moved");
    let old = h.doc.insert_video(
        &root,
        FakeVideo::new(src.clone()).ready_after(Duration::from_secs(5)),
    );
    h.session.activate(&locator()).await.unwrap();
    h.until(|e| matches!(e, PipelineEvent::Started { .. })).await;

    // The page swaps the element for a fresh one with the same source.
    h.doc.detach(&old);
    let fresh = h.doc.append_video(&root, FakeVideo::new(src));

    match h.until(|e| matches!(e, PipelineEvent::Failed { .. })).await {
        PipelineEvent::Failed {
            identity,
            will_retry,
            ..
        } => {
            assert_eq!(identity.as_str(), "moved");
            assert!(will_retry);
        }
        _ => unreachable!(),
    }
    assert_eq!(h.outcome_of("moved").await, None);

    assert_eq!(h.next_stored().await.as_str(), "moved");
    assert_eq!(h.sink.writes_for(&"moved".into()), 1);
    assert_eq!(h.outcome_of("moved").await, Some(RecordOutcome::Stored));
    assert_eq!(h.doc.snapshots(), vec![fresh]);

    h.session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_detached_video_is_picked_up_when_it_reappears() {
    let mut h = Harness::new(PipelineConfig::default());
    let root = h.doc.add_container(CONTAINER);
    let src = stream_src("flaky");
    let old = h.doc.insert_video(
        &root,
        FakeVideo::new(src.clone()).ready_after(Duration::from_secs(5)),
    );
    h.session.activate(&locator()).await.unwrap();
    h.until(|e| matches!(e, PipelineEvent::Started { .. })).await;
    h.doc.detach(&old);

    match h.until(|e| matches!(e, PipelineEvent::Failed { .. })).await {
        PipelineEvent::Failed { will_retry, .. } => assert!(!will_retry),
        _ => unreachable!(),
    }
    // Neither recorded nor held by the queue.
    assert_eq!(h.outcome_of("flaky").await, None);

    let fresh = h.doc.append_video(&root, FakeVideo::new(src));
    assert_eq!(h.next_stored().await.as_str(), "flaky");
    assert_eq!(h.outcome_of("flaky").await, Some(RecordOutcome::Stored));
    assert_eq!(h.doc.snapshots(), vec![fresh]);

    h.session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_never_ready_video_does_not_block_the_next() {
    let config = PipelineConfig::default();
    let ready_timeout = config.extractor.ready_timeout;
    let mut h = Harness::new(config);
    let root = h.doc.add_container(CONTAINER);
    let stuck = h
        .doc
        .insert_video(&root, FakeVideo::new(stream_src("stuck")).never_ready());
    h.doc.insert_video(&root, FakeVideo::new(stream_src("fine")));

    let started = Instant::now();
    h.session.activate(&locator()).await.unwrap();

    let failed = h
        .until(|e| matches!(e, PipelineEvent::Failed { .. }))
        .await;
    match failed {
        PipelineEvent::Failed {
            identity,
            stage,
            will_retry,
            ..
        } => {
            assert_eq!(identity.as_str(), "stuck");
            assert_eq!(stage, "awaiting_ready");
            assert!(will_retry);
        }
        _ => unreachable!(),
    }
    assert!(started.elapsed() >= ready_timeout);
    assert_eq!(h.doc.pause_count(&stuck), 1);

    assert_eq!(h.next_stored().await.as_str(), "fine");
    assert_eq!(h.outcome_of("stuck").await, None);

    h.session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_items_are_paced_by_cooldown() {
    let config = PipelineConfig::default();
    let cooldown = config.cooldown;
    let mut h = Harness::new(config);
    let root = h.doc.add_container(CONTAINER);
    for n in 0..3 {
        h.doc
            .insert_video(&root, FakeVideo::new(stream_src(&format!("p{}", n))));
    }
    h.session.activate(&locator()).await.unwrap();

    let mut stamps = Vec::new();
    for _ in 0..3 {
        h.next_stored().await;
        stamps.push(Instant::now());
    }
    for pair in stamps.windows(2) {
        assert!(pair[1] - pair[0] >= cooldown);
    }

    h.session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_items_are_processed_in_arrival_order() {
    let mut h = Harness::new(PipelineConfig {
        cooldown: Duration::from_millis(100),
        ..PipelineConfig::default()
    });
    let root = h.doc.add_container(CONTAINER);
    h.doc.insert_video(&root, FakeVideo::new(stream_src("o0")));
    h.doc.insert_video(&root, FakeVideo::new(stream_src("o1")));
    h.session.activate(&locator()).await.unwrap();

    h.doc.append_video(&root, FakeVideo::new(stream_src("o2")));
    let (_, _) = h.doc.append_subtree(
        &root,
        vec![
            FakeVideo::new(stream_src("o3")),
            FakeVideo::new(stream_src("o4")),
        ],
    );
    h.doc.append_video(&root, FakeVideo::new(stream_src("o5")));

    let mut order = Vec::new();
    for _ in 0..6 {
        order.push(h.next_stored().await.to_string());
    }
    assert_eq!(order, ["o0", "o1", "o2", "o3", "o4", "o5"]);

    h.session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_initial_scan_skips_recorded_identities() {
    let mut h = Harness::new(PipelineConfig::default());
    let root = h.doc.add_container(CONTAINER);
    for n in 0..6 {
        h.doc
            .insert_video(&root, FakeVideo::new(stream_src(&format!("s{}", n))));
    }
    for n in [0, 2, 5] {
        h.ledger
            .mark_processed(&format!("s{}", n).into(), 1_700_000_000_000, RecordOutcome::Stored)
            .await
            .unwrap();
    }

    let summary = h.session.activate(&locator()).await.unwrap();
    assert_eq!(summary.seen, 6);
    assert_eq!(summary.enqueued, 3);
    assert_eq!(summary.already_processed, 3);

    let mut stored = Vec::new();
    for _ in 0..3 {
        stored.push(h.next_stored().await.to_string());
    }
    assert_eq!(stored, ["s1", "s3", "s4"]);
    assert_eq!(h.sink.frames().len(), 3);

    h.session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_missing_container_is_fatal() {
    let mut h = Harness::new(PipelineConfig::default());
    h.doc.add_container("/html/body/other");

    let err = h.session.activate(&locator()).await.unwrap_err();
    assert!(matches!(err, WorkerError::ContainerNotFound(_)));
    assert!(err.is_fatal());
    assert!(!h.session.is_active());
    assert_eq!(h.doc.observer_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_activating_twice_is_rejected() {
    let mut h = Harness::new(PipelineConfig::default());
    h.doc.add_container(CONTAINER);
    h.session.activate(&locator()).await.unwrap();

    let err = h.session.activate(&locator()).await.unwrap_err();
    assert!(matches!(err, WorkerError::AlreadyActive));

    h.session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_retry_policy_gives_up_after_max_attempts() {
    let mut h = Harness::new(PipelineConfig {
        retry: RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        },
        ..PipelineConfig::default()
    });
    let root = h.doc.add_container(CONTAINER);
    let node = h
        .doc
        .insert_video(&root, FakeVideo::new(stream_src("flaky")).never_ready());
    h.session.activate(&locator()).await.unwrap();

    let mut attempts = Vec::new();
    loop {
        let event = h
            .until(|e| matches!(e, PipelineEvent::Started { .. } | PipelineEvent::Failed { .. }))
            .await;
        match event {
            PipelineEvent::Started { attempt, .. } => attempts.push(attempt),
            PipelineEvent::Failed {
                will_retry: false, ..
            } => break,
            _ => {}
        }
    }

    assert_eq!(attempts, [1, 2]);
    assert_eq!(h.outcome_of("flaky").await, Some(RecordOutcome::Failed));
    assert!(h.sink.frames().is_empty());
    assert_eq!(h.doc.pause_count(&node), 2);

    h.session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_mark_processed_policy_records_failure_immediately() {
    let mut h = Harness::new(PipelineConfig {
        failure_policy: FailurePolicy::MarkProcessed,
        ..PipelineConfig::default()
    });
    let root = h.doc.add_container(CONTAINER);
    h.doc.insert_video(
        &root,
        FakeVideo::new(stream_src("broken")).with_duration(None),
    );
    h.session.activate(&locator()).await.unwrap();

    let event = h.until(is_final).await;
    assert!(matches!(
        event,
        PipelineEvent::Failed { ref stage, will_retry: false, .. } if stage == "seeking"
    ));
    assert_eq!(h.outcome_of("broken").await, Some(RecordOutcome::Failed));
    assert!(!h.session.queue().contains(&"broken".into()));

    h.session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sink_failure_is_not_recorded_as_stored() {
    let mut h = Harness::new(PipelineConfig {
        retry: RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        },
        ..PipelineConfig::default()
    });
    let root = h.doc.add_container(CONTAINER);
    h.doc.insert_video(&root, FakeVideo::new(stream_src("later")));
    h.sink.set_failing(true);
    h.session.activate(&locator()).await.unwrap();

    let event = h
        .until(|e| matches!(e, PipelineEvent::Failed { .. }))
        .await;
    assert!(matches!(
        event,
        PipelineEvent::Failed { ref stage, will_retry: true, .. } if stage == "storing"
    ));
    assert_eq!(h.outcome_of("later").await, None);

    h.sink.set_failing(false);
    assert_eq!(h.next_stored().await.as_str(), "later");
    assert_eq!(h.outcome_of("later").await, Some(RecordOutcome::Stored));
    assert_eq!(h.sink.writes_for(&"later".into()), 1);

    h.session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_restart_does_not_reprocess() {
    let dir = TempDir::new().unwrap();
    let backend = LedgerBackend::File {
        data_dir: dir.path().to_path_buf(),
    };
    let scope = SourceScope::new("chat-42");

    {
        let ledger = open_ledger(&backend, &scope).await.unwrap();
        let mut h = Harness::with_ledger(PipelineConfig::default(), ledger);
        let root = h.doc.add_container(CONTAINER);
        h.doc.insert_video(&root, FakeVideo::new(stream_src("kept")));
        h.session.activate(&locator()).await.unwrap();
        h.next_stored().await;
        h.session.shutdown().await.unwrap();
    }

    let ledger = open_ledger(&backend, &scope).await.unwrap();
    let mut h = Harness::with_ledger(PipelineConfig::default(), ledger);
    let root = h.doc.add_container(CONTAINER);
    h.doc.insert_video(&root, FakeVideo::new(stream_src("kept")));
    h.doc.insert_video(&root, FakeVideo::new(stream_src("fresh")));

    let summary = h.session.activate(&locator()).await.unwrap();
    assert_eq!(summary.already_processed, 1);
    assert_eq!(summary.enqueued, 1);
    assert_eq!(h.next_stored().await.as_str(), "fresh");
    assert_eq!(h.sink.writes_for(&"kept".into()), 0);

    h.session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_live_additions_are_processed() {
    let mut h = Harness::new(PipelineConfig::default());
    let root = h.doc.add_container(CONTAINER);
    let summary = h.session.activate(&locator()).await.unwrap();
    assert_eq!(summary.seen, 0);

    let plain = "blob:https://web.example.org/8e41";
    h.doc.append_video(&root, FakeVideo::without_source());
    h.doc.append_video(&root, FakeVideo::new(plain));

    assert_eq!(h.next_stored().await.as_str(), plain);
    assert_eq!(h.sink.frames().len(), 1);

    h.session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_mid_extraction_leaves_item_unrecorded() {
    let mut h = Harness::new(PipelineConfig::default());
    let root = h.doc.add_container(CONTAINER);
    h.doc.insert_video(
        &root,
        FakeVideo::new(stream_src("slow")).ready_after(Duration::from_secs(20)),
    );
    h.session.activate(&locator()).await.unwrap();
    h.until(|e| matches!(e, PipelineEvent::Started { .. })).await;

    let ledger = h.ledger.clone();
    h.session.shutdown().await.unwrap();

    assert_eq!(ledger.get(&"slow".into()).await.unwrap(), None);
    assert!(h.sink.frames().is_empty());
}
