//! Stale lockfile sweep
//!
//! A `.lock` file is only removed after winning a non-blocking exclusive
//! flock on it; a held lock means the owning process is still alive.

#![allow(unsafe_code)]

use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::Path;

use hops_errors::Error;
use tracing::debug;

use crate::cache::{is_dir, sorted_children};
use crate::{Cleaner, CleanupReport};

fn try_exclusive_lock(file: &File) -> bool {
    // SAFETY: flock on an owned, open descriptor.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    rc == 0
}

fn is_lockfile(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "lock")
}

impl Cleaner {
    /// Remove abandoned `.lock` files from the cache. Never run in dry-run;
    /// taking the lock is itself an observable side effect.
    pub(crate) async fn sweep_lockfiles(&self) -> Result<CleanupReport, Error> {
        let mut report = CleanupReport::default();
        if !is_dir(&self.cache).await {
            return Ok(report);
        }

        for path in sorted_children(&self.cache).await? {
            if !is_lockfile(&path) {
                continue;
            }
            let Ok(meta) = tokio::fs::symlink_metadata(&path).await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }

            let Ok(file) = File::open(&path) else {
                continue;
            };
            if try_exclusive_lock(&file) {
                // The descriptor stays open until after the unlink; dropping
                // it releases the lock.
                self.remove_path(&path, &mut report).await?;
            } else {
                debug!(path = %path.display(), "lockfile still held, keeping");
                self.skip(&path, "lock held by another process");
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cleaner;

    fn cleaner(root: &std::path::Path) -> Cleaner {
        Cleaner::new(
            root.join("cache"),
            root.join("Cellar"),
            root.join("logs"),
            root.to_path_buf(),
        )
    }

    #[tokio::test]
    async fn removes_unheld_lockfiles_only() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();
        std::fs::write(cache.join("wget.lock"), b"").unwrap();
        std::fs::write(cache.join("held.lock"), b"").unwrap();
        std::fs::write(cache.join("tarball.tar.gz"), b"data").unwrap();

        let held = File::open(cache.join("held.lock")).unwrap();
        assert!(try_exclusive_lock(&held));

        let report = cleaner(dir.path()).sweep_lockfiles().await.unwrap();
        assert_eq!(report.paths_removed, 1);
        assert!(!cache.join("wget.lock").exists());
        assert!(cache.join("held.lock").exists());
        assert!(cache.join("tarball.tar.gz").exists());
        drop(held);
    }
}
