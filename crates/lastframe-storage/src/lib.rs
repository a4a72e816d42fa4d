//! Dedup ledger and frame output.
//!
//! This crate provides:
//! - The durable dedup ledger over pluggable backends (JSON file, Redis, memory)
//! - Output sinks for captured frames (local directory, Cloudflare R2)
//! - Deterministic object naming from resource identities
//! - Atomic file writes

pub mod client;
pub mod error;
pub mod file_ledger;
pub mod fs_utils;
pub mod ledger;
pub mod naming;
pub mod redis_ledger;
pub mod sink;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use file_ledger::FileLedger;
pub use ledger::{DedupLedger, LedgerStore, MarkOutcome, MemoryLedger};
pub use naming::{frame_object_name, scope_key};
pub use redis_ledger::RedisLedger;
pub use sink::{FsSink, MemorySink, OutputSink, R2Sink, StoredFrame};
