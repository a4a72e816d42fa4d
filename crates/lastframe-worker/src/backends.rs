//! Construction of ledger and sink backends from configuration.

use std::sync::Arc;

use lastframe_models::SourceScope;
use lastframe_storage::{
    DedupLedger, FileLedger, FsSink, LedgerStore, MemoryLedger, OutputSink, R2Client, R2Sink,
    RedisLedger,
};
use tracing::info;

use crate::config::{LedgerBackend, OutputBackend};
use crate::error::WorkerResult;

/// Open the dedup ledger for `scope`.
pub async fn open_ledger(backend: &LedgerBackend, scope: &SourceScope) -> WorkerResult<DedupLedger> {
    let store: Arc<dyn LedgerStore> = match backend {
        LedgerBackend::File { data_dir } => Arc::new(FileLedger::open(data_dir, scope).await?),
        LedgerBackend::Redis { url } => Arc::new(RedisLedger::connect(url, scope).await?),
        LedgerBackend::Memory => Arc::new(MemoryLedger::new()),
    };

    let ledger = DedupLedger::new(store, scope.clone());
    info!(
        scope = %scope,
        backend = ledger.backend(),
        records = ledger.len().await?,
        "Ledger ready"
    );
    Ok(ledger)
}

/// Build the frame output sink.
pub async fn open_sink(backend: &OutputBackend) -> WorkerResult<Arc<dyn OutputSink>> {
    let sink: Arc<dyn OutputSink> = match backend {
        OutputBackend::Fs { dir } => {
            tokio::fs::create_dir_all(dir).await?;
            Arc::new(FsSink::new(dir.clone()))
        }
        OutputBackend::R2 { prefix } => {
            let client = R2Client::from_env()?;
            client.check_connectivity().await?;
            Arc::new(R2Sink::new(client, prefix.clone()))
        }
    };
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lastframe_models::{CapturedFrame, RecordOutcome};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_ledger_from_config() {
        let temp_dir = TempDir::new().unwrap();
        let backend = LedgerBackend::File {
            data_dir: temp_dir.path().to_path_buf(),
        };
        let scope = SourceScope::default();

        let ledger = open_ledger(&backend, &scope).await.unwrap();
        ledger
            .mark_now(&"abc123".into(), RecordOutcome::Stored)
            .await
            .unwrap();

        let reopened = open_ledger(&backend, &scope).await.unwrap();
        assert!(reopened.has(&"abc123".into()).await.unwrap());
        assert_eq!(reopened.backend(), "file");
    }

    #[tokio::test]
    async fn test_fs_sink_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("frames");
        let sink = open_sink(&OutputBackend::Fs { dir: dir.clone() }).await.unwrap();

        sink.store(&CapturedFrame {
            identity: "abc123".into(),
            png: vec![1, 2, 3],
            width: 1,
            height: 1,
        })
        .await
        .unwrap();
        assert!(dir.join("final_frame_abc123.png").exists());
    }
}
