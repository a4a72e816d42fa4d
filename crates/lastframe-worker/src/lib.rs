//! Last-frame capture pipeline.
//!
//! This crate provides:
//! - The ingestion watcher (initial scan and live additions)
//! - The single-lane queue processor with pacing and failure policy
//! - The monitor session that owns both and their shared state
//! - Configuration, structured item logging and metrics

pub mod backends;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod retry;
pub mod session;
pub mod watcher;

pub use config::{LedgerBackend, MonitorConfig, OutputBackend, PipelineConfig};
pub use error::{WorkerError, WorkerResult};
pub use logging::ItemLogger;
pub use processor::{ItemOutcome, QueueProcessor};
pub use retry::{FailurePolicy, RetryConfig};
pub use session::MonitorSession;
pub use watcher::{ActiveWatch, Consideration, IngestionWatcher, ScanSummary};
