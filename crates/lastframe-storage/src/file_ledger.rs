//! JSON file ledger backend.
//!
//! One file per scope at `<data_dir>/ledger/<scope>.json`, loaded fully at
//! open and rewritten atomically on every insert. Ledgers stay small (one
//! entry per video ever seen), so a full rewrite is cheap next to a frame
//! capture.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lastframe_models::{ProcessedRecord, ResourceIdentity, SourceScope};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{StorageError, StorageResult};
use crate::fs_utils::write_atomic;
use crate::ledger::LedgerStore;
use crate::naming::scope_key;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    scope: SourceScope,
    records: Vec<ProcessedRecord>,
}

/// Ledger persisted as a JSON document.
pub struct FileLedger {
    path: PathBuf,
    scope: SourceScope,
    records: Mutex<HashMap<ResourceIdentity, ProcessedRecord>>,
}

impl FileLedger {
    /// Open (or create on first write) the ledger for `scope` under `data_dir`.
    pub async fn open(data_dir: impl AsRef<Path>, scope: &SourceScope) -> StorageResult<Self> {
        let path = Self::path_for(data_dir.as_ref(), scope);
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => Self::parse(&path, &bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            scope = %scope,
            path = %path.display(),
            records = records.len(),
            "Opened file ledger"
        );

        Ok(Self {
            path,
            scope: scope.clone(),
            records: Mutex::new(records),
        })
    }

    /// Location of the ledger file for `scope`.
    pub fn path_for(data_dir: &Path, scope: &SourceScope) -> PathBuf {
        data_dir
            .join("ledger")
            .join(format!("{}.json", scope_key(scope)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(
        path: &Path,
        bytes: &[u8],
    ) -> StorageResult<HashMap<ResourceIdentity, ProcessedRecord>> {
        let file: LedgerFile = serde_json::from_slice(bytes).map_err(|e| {
            StorageError::corrupt_ledger(format!("{}: {}", path.display(), e))
        })?;
        if file.version != FORMAT_VERSION {
            return Err(StorageError::corrupt_ledger(format!(
                "{}: unsupported version {}",
                path.display(),
                file.version
            )));
        }

        let mut records = HashMap::with_capacity(file.records.len());
        for record in file.records {
            // Keep the earliest record if the file somehow holds duplicates.
            records.entry(record.identity.clone()).or_insert(record);
        }
        Ok(records)
    }

    fn serialize(&self, records: &HashMap<ResourceIdentity, ProcessedRecord>) -> StorageResult<Vec<u8>> {
        let mut sorted: Vec<ProcessedRecord> = records.values().cloned().collect();
        sorted.sort_by(|a, b| {
            a.processed_at_ms
                .cmp(&b.processed_at_ms)
                .then_with(|| a.identity.cmp(&b.identity))
        });

        let file = LedgerFile {
            version: FORMAT_VERSION,
            scope: self.scope.clone(),
            records: sorted,
        };
        Ok(serde_json::to_vec_pretty(&file)?)
    }
}

#[async_trait]
impl LedgerStore for FileLedger {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn contains(&self, identity: &ResourceIdentity) -> StorageResult<bool> {
        Ok(self.records.lock().await.contains_key(identity))
    }

    async fn get(&self, identity: &ResourceIdentity) -> StorageResult<Option<ProcessedRecord>> {
        Ok(self.records.lock().await.get(identity).cloned())
    }

    async fn insert_if_absent(&self, record: &ProcessedRecord) -> StorageResult<bool> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.identity) {
            return Ok(false);
        }

        records.insert(record.identity.clone(), record.clone());
        let bytes = self.serialize(&records)?;
        if let Err(e) = write_atomic(&self.path, &bytes).await {
            // Not durable, so not recorded.
            records.remove(&record.identity);
            return Err(e);
        }
        Ok(true)
    }

    async fn len(&self) -> StorageResult<usize> {
        Ok(self.records.lock().await.len())
    }
}
