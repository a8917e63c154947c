//! Utility functions shared by the pipeline stages

use crate::error::{Error, Result};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless `cancel` fires first
///
/// Returns [`Error::Cancelled`] as soon as the token is cancelled, including when it
/// already was before the call.
pub async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Write `contents` to `path` via a sibling `.part` file and a rename
///
/// Readers never observe a half-written file at `path`. The `.part` file is removed
/// if anything fails after it was created.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"))?;
    let mut part_name = file_name.to_os_string();
    part_name.push(".part");
    let part_path = path.with_file_name(part_name);

    let result = async {
        let mut file = tokio::fs::File::create(&part_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&part_path, path).await
    }
    .await;

    if result.is_err() {
        // Cleanup is best effort; `result` carries the failure
        let _ = tokio::fs::remove_file(&part_path).await;
    }
    result
}

/// Shorten a response body for log and error messages
pub(crate) fn truncate_body(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn sleep_completes_without_cancel() {
        let cancel = CancellationToken::new();
        sleep_or_cancel(&cancel, Duration::from_millis(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sleep_returns_early_on_cancel() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let start = std::time::Instant::now();
        let result = sleep_or_cancel(&cancel, Duration::from_secs(30)).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "cancel should interrupt the sleep, took {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn sleep_refuses_when_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = sleep_or_cancel(&cancel, Duration::ZERO).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn write_atomic_replaces_contents_and_leaves_no_part_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("1_2.manifest");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!temp_dir.path().join("1_2.manifest.part").exists());
    }

    #[tokio::test]
    async fn write_atomic_cleans_up_when_rename_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blocked.manifest");
        // A directory in the way makes the final rename fail
        fs::create_dir(&path).unwrap();

        let result = write_atomic(&path, b"payload").await;

        assert!(result.is_err());
        assert!(path.is_dir());
        assert!(!temp_dir.path().join("blocked.manifest.part").exists());
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        assert_eq!(truncate_body("  short  ", 10), "short");
        assert_eq!(truncate_body("abcdef", 3), "abc...");
        assert_eq!(truncate_body("ééééé", 2), "éé...");
    }
}
