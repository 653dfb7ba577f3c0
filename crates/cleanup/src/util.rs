//! Shared removal and size-accounting helpers

use std::path::Path;

use hops_errors::CleanupError;
use hops_events::CleanupEvent;

use crate::{Cleaner, CleanupReport};

pub(crate) fn scan_err(path: &Path, e: &std::io::Error) -> CleanupError {
    CleanupError::ScanFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

pub(crate) fn removal_err(path: &Path, e: &std::io::Error) -> CleanupError {
    CleanupError::RemovalFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

/// Bytes occupied by a file or a directory tree.
pub(crate) async fn disk_usage(path: &Path) -> u64 {
    let Ok(meta) = tokio::fs::symlink_metadata(path).await else {
        return 0;
    };
    if !meta.is_dir() {
        return meta.len();
    }

    let mut total = 0;
    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if let Ok(meta) = tokio::fs::symlink_metadata(entry.path()).await {
                total += meta.len();
            }
        }
    }
    total
}

impl Cleaner {
    /// Remove `path` (file or tree), emit the event and account the size.
    pub(crate) async fn remove_path(
        &self,
        path: &Path,
        report: &mut CleanupReport,
    ) -> Result<(), CleanupError> {
        let size = disk_usage(path).await;
        self.emit(CleanupEvent::PathRemoved {
            path: path.display().to_string(),
            size_bytes: size,
            dry_run: self.dry_run,
        });

        if !self.dry_run {
            let meta = tokio::fs::symlink_metadata(path)
                .await
                .map_err(|e| removal_err(path, &e))?;
            if meta.is_dir() {
                tokio::fs::remove_dir_all(path)
                    .await
                    .map_err(|e| removal_err(path, &e))?;
            } else {
                tokio::fs::remove_file(path)
                    .await
                    .map_err(|e| removal_err(path, &e))?;
            }
        }

        report.paths_removed += 1;
        report.reclaimed_bytes += size;
        Ok(())
    }

    pub(crate) fn skip(&self, path: &Path, reason: &str) {
        self.emit(CleanupEvent::PathSkipped {
            path: path.display().to_string(),
            reason: reason.to_string(),
        });
    }
}
