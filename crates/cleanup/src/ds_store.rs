//! Parallel `.DS_Store` sweep under the prefix

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use hops_errors::Error;
use tracing::debug;

use crate::Cleaner;

/// Prefix subdirectories Finder tends to litter.
const PREFIX_SUBDIRS: &[&str] = &[
    "Cellar",
    "Frameworks",
    "Library",
    "bin",
    "etc",
    "include",
    "lib",
    "opt",
    "sbin",
    "share",
    "var",
];

fn sweep_tree(root: &PathBuf) {
    let mut stack = vec![root.clone()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                stack.push(path);
            } else if path.file_name().is_some_and(|n| n == ".DS_Store") {
                if let Err(e) = std::fs::remove_file(&path) {
                    debug!(path = %path.display(), error = %e, "failed to remove .DS_Store");
                }
            }
        }
    }
}

impl Cleaner {
    /// Delete `.DS_Store` files beneath the standard prefix subdirectories,
    /// one blocking worker per core draining a shared queue. Removals are
    /// not accounted; Finder metadata is noise, not reclaimed space.
    pub(crate) async fn sweep_ds_store(&self) -> Result<(), Error> {
        let mut queue = Vec::new();
        for sub in PREFIX_SUBDIRS {
            let path = self.prefix.join(sub);
            if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
                queue.push(path);
            }
        }
        if queue.is_empty() {
            return Ok(());
        }

        let workers = std::thread::available_parallelism()
            .map_or(2, std::num::NonZeroUsize::get)
            .min(queue.len());
        let queue = Arc::new(Mutex::new(queue));

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            handles.push(tokio::task::spawn_blocking(move || loop {
                let next = queue.lock().ok().and_then(|mut q| q.pop());
                match next {
                    Some(dir) => sweep_tree(&dir),
                    None => break,
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }
}
