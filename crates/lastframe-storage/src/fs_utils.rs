//! Filesystem utilities for durable writes.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::StorageResult;

/// Write `data` to `dst` so readers see either the old or the new content.
///
/// The bytes go to a temporary sibling first, are synced, and then renamed
/// over the destination. The parent directory is created if needed.
pub async fn write_atomic(dst: impl AsRef<Path>, data: &[u8]) -> StorageResult<()> {
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let tmp = temp_path(dst);
    if let Err(e) = write_synced(&tmp, data).await {
        let _ = fs::remove_file(&tmp).await;
        tracing::error!("Failed to write temp file {}: {}", tmp.display(), e);
        return Err(e.into());
    }

    fs::rename(&tmp, dst).await.map_err(|e| {
        // Clean up temp file on failure
        let _ = std::fs::remove_file(&tmp);
        tracing::error!(
            "Failed to rename temp file {} -> {}: {}",
            tmp.display(),
            dst.display(),
            e
        );
        e
    })?;

    tracing::trace!("Wrote {} bytes to {}", data.len(), dst.display());
    Ok(())
}

async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

/// Temp file next to `dst` (same filesystem, so the rename is atomic).
fn temp_path(dst: &Path) -> PathBuf {
    let mut name = dst
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    dst.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parent_and_replaces() {
        let temp_dir = TempDir::new().unwrap();
        let dst = temp_dir.path().join("nested").join("out.bin");

        write_atomic(&dst, b"first").await.unwrap();
        write_atomic(&dst, b"second").await.unwrap();

        assert_eq!(fs::read(&dst).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let dst = temp_dir.path().join("out.bin");

        write_atomic(&dst, b"data").await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("out.bin")]);
    }
}
