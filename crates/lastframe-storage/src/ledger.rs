//! The dedup ledger.
//!
//! A durable set of identities that have already been handled, with the time
//! and outcome of handling. One record per identity; the first write wins and
//! later writes are reported as [`MarkOutcome::AlreadyPresent`], never as
//! errors.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use lastframe_models::{ProcessedRecord, RecordOutcome, ResourceIdentity, SourceScope};
use tracing::debug;

use crate::error::StorageResult;

/// Backend storage for one scope's ledger records.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    async fn contains(&self, identity: &ResourceIdentity) -> StorageResult<bool>;

    async fn get(&self, identity: &ResourceIdentity) -> StorageResult<Option<ProcessedRecord>>;

    /// Store `record` unless its identity is already present.
    ///
    /// Returns `true` if the record was written.
    async fn insert_if_absent(&self, record: &ProcessedRecord) -> StorageResult<bool>;

    async fn len(&self) -> StorageResult<usize>;
}

/// Result of [`DedupLedger::mark_processed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Inserted,
    AlreadyPresent,
}

/// Scoped dedup ledger over a [`LedgerStore`].
#[derive(Clone)]
pub struct DedupLedger {
    store: Arc<dyn LedgerStore>,
    scope: SourceScope,
}

impl DedupLedger {
    pub fn new(store: Arc<dyn LedgerStore>, scope: SourceScope) -> Self {
        Self { store, scope }
    }

    /// An ephemeral ledger that forgets everything on drop.
    pub fn in_memory(scope: SourceScope) -> Self {
        Self::new(Arc::new(MemoryLedger::new()), scope)
    }

    pub fn scope(&self) -> &SourceScope {
        &self.scope
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Whether `identity` has already been handled.
    pub async fn has(&self, identity: &ResourceIdentity) -> StorageResult<bool> {
        self.store.contains(identity).await
    }

    pub async fn get(&self, identity: &ResourceIdentity) -> StorageResult<Option<ProcessedRecord>> {
        self.store.get(identity).await
    }

    /// Record `identity` as handled at `processed_at_ms`.
    ///
    /// Idempotent: an identity that is already recorded keeps its original
    /// record.
    pub async fn mark_processed(
        &self,
        identity: &ResourceIdentity,
        processed_at_ms: i64,
        outcome: RecordOutcome,
    ) -> StorageResult<MarkOutcome> {
        let record = ProcessedRecord::new(identity.clone(), processed_at_ms, outcome);
        let inserted = self.store.insert_if_absent(&record).await?;

        debug!(
            scope = %self.scope,
            identity = %identity,
            outcome = outcome.as_str(),
            inserted,
            "Ledger mark"
        );

        Ok(if inserted {
            MarkOutcome::Inserted
        } else {
            MarkOutcome::AlreadyPresent
        })
    }

    /// Record `identity` as handled now.
    pub async fn mark_now(
        &self,
        identity: &ResourceIdentity,
        outcome: RecordOutcome,
    ) -> StorageResult<MarkOutcome> {
        let now = chrono::Utc::now().timestamp_millis();
        self.mark_processed(identity, now, outcome).await
    }

    pub async fn len(&self) -> StorageResult<usize> {
        self.store.len().await
    }
}

/// Ledger kept in process memory.
#[derive(Default)]
pub struct MemoryLedger {
    records: RwLock<HashMap<ResourceIdentity, ProcessedRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ResourceIdentity, ProcessedRecord>> {
        self.records.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn contains(&self, identity: &ResourceIdentity) -> StorageResult<bool> {
        Ok(self.read().contains_key(identity))
    }

    async fn get(&self, identity: &ResourceIdentity) -> StorageResult<Option<ProcessedRecord>> {
        Ok(self.read().get(identity).cloned())
    }

    async fn insert_if_absent(&self, record: &ProcessedRecord) -> StorageResult<bool> {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if records.contains_key(&record.identity) {
            return Ok(false);
        }
        records.insert(record.identity.clone(), record.clone());
        Ok(true)
    }

    async fn len(&self) -> StorageResult<usize> {
        Ok(self.read().len())
    }
}
