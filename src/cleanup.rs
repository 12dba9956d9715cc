//! Best-effort removal of transient files left in the work directory

use crate::concat::CONCAT_LIST_SUFFIX;
use crate::utils::{PARTIAL_EXTENSION, TRANSIENT_PREFIX};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Whether a file name matches one of the transient naming patterns
///
/// Transient files are downloads in flight (`fdl-part-*`), partial writes
/// (`*.partial` or `*.partial.<ext>`) and concat list files (`*.concat.txt`).
pub fn is_transient(file_name: &str) -> bool {
    file_name.starts_with(TRANSIENT_PREFIX)
        || file_name.split_once('.').is_some_and(|(_, extensions)| {
            extensions
                .rsplit('.')
                .take(2)
                .any(|ext| ext.eq_ignore_ascii_case(PARTIAL_EXTENSION))
        })
        || file_name.ends_with(CONCAT_LIST_SUFFIX)
}

/// Remove transient files from `work_dir`
///
/// Only the top level of the directory is scanned. Errors are logged as
/// warnings and never fail the caller. Returns the number of files removed.
pub async fn cleanup_transient(work_dir: &Path) -> usize {
    use tokio::fs;

    let mut entries = match fs::read_dir(work_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(?work_dir, "work directory does not exist, skipping cleanup");
            return 0;
        }
        Err(e) => {
            warn!(?work_dir, error = %e, "failed to read directory during cleanup");
            return 0;
        }
    };

    let mut targets: Vec<PathBuf> = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file && entry.file_name().to_str().is_some_and(is_transient) {
            targets.push(entry.path());
        }
    }

    let mut deleted_files = 0;
    for file in &targets {
        match fs::remove_file(file).await {
            Ok(()) => {
                debug!(?file, "deleted transient file");
                deleted_files += 1;
            }
            Err(e) => warn!(?file, error = %e, "failed to delete file"),
        }
    }

    if deleted_files > 0 {
        info!(?work_dir, deleted_files, "cleanup complete");
    }
    deleted_files
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::transient_file_name;
    use tempfile::TempDir;

    #[test]
    fn recognizes_transient_patterns() {
        assert!(is_transient(&transient_file_name("pexels", "mp4")));
        assert!(is_transient("filler-1.mp4.partial"));
        assert!(is_transient("clip.partial.mp4"));
        assert!(!is_transient("partial.mp4"));
        assert!(is_transient("filler-1.mp4.concat.txt"));
        assert!(!is_transient("filler-1.mp4"));
        assert!(!is_transient("uploads.json"));
    }

    #[tokio::test]
    async fn removes_only_transient_files() {
        let dir = TempDir::new().unwrap();
        let keep = dir.path().join("filler-20260101.mp4");
        std::fs::write(&keep, b"artifact").unwrap();
        for name in [
            transient_file_name("yt-dlp", "mp4"),
            "x.mp4.partial".to_string(),
            "y.partial.mp4".to_string(),
            "filler-20260101.mp4.concat.txt".to_string(),
        ] {
            std::fs::write(dir.path().join(name), b"junk").unwrap();
        }
        std::fs::create_dir(dir.path().join("fdl-part-dir")).unwrap();

        let removed = cleanup_transient(dir.path()).await;

        assert_eq!(removed, 4);
        assert!(keep.exists());
        assert!(dir.path().join("fdl-part-dir").exists(), "directories are left alone");
    }

    #[tokio::test]
    async fn missing_directory_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        assert_eq!(cleanup_transient(&dir.path().join("nope")).await, 0);
    }
}
