//! Download cache sweep

use std::path::Path;

use hops_errors::Error;
use tracing::debug;

use crate::util::scan_err;
use crate::version::{compare_versions, split_artifact_name};
use crate::{Cleaner, CleanupReport};

impl Cleaner {
    /// Sweep the download cache.
    ///
    /// In order of precedence per entry: half-finished `.incomplete`
    /// downloads always go; scratch directories go by name; with `--prune`,
    /// anything past the age threshold goes; versioned artifacts superseded
    /// by the newest installed keg go; with `--scrub`, versioned artifacts
    /// of packages not in the cellar at all go too.
    pub(crate) async fn sweep_cache(&self) -> Result<CleanupReport, Error> {
        let mut report = CleanupReport::default();
        if !is_dir(&self.cache).await {
            return Ok(report);
        }

        for path in sorted_children(&self.cache).await? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let meta = match tokio::fs::symlink_metadata(&path).await {
                Ok(meta) => meta,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable cache entry");
                    continue;
                }
            };

            if name.ends_with(".incomplete") {
                self.remove_path(&path, &mut report).await?;
                continue;
            }

            if meta.is_dir() && self.scratch_dirs.iter().any(|d| d == name) {
                self.remove_path(&path, &mut report).await?;
                continue;
            }

            if let Some(prune) = self.prune {
                if meta
                    .modified()
                    .is_ok_and(|modified| prune.is_stale(modified, self.now))
                {
                    self.remove_path(&path, &mut report).await?;
                    continue;
                }
            }

            if !meta.is_file() {
                continue;
            }
            let Some((pkg, version)) = split_artifact_name(name) else {
                continue;
            };

            match self.newest_keg_version(pkg).await? {
                None => {
                    if self.scrub {
                        self.remove_path(&path, &mut report).await?;
                    } else {
                        self.skip(&path, "package not installed");
                    }
                }
                Some(newest) => {
                    if compare_versions(&newest, version).is_gt() {
                        self.remove_path(&path, &mut report).await?;
                    } else {
                        self.skip(&path, "artifact matches installed version");
                    }
                }
            }
        }
        Ok(report)
    }

    /// Newest keg version directory of `pkg`, or `None` when not installed.
    pub(crate) async fn newest_keg_version(&self, pkg: &str) -> Result<Option<String>, Error> {
        let rack = self.cellar.join(pkg);
        if !is_dir(&rack).await {
            return Ok(None);
        }

        let mut newest: Option<String> = None;
        for path in sorted_children(&rack).await? {
            if !is_dir(&path).await {
                continue;
            }
            let Some(version) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match &newest {
                Some(best) if compare_versions(best, version).is_ge() => {}
                _ => newest = Some(version.to_string()),
            }
        }
        Ok(newest)
    }
}

pub(crate) async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_dir())
}

/// Directory children in stable name order.
pub(crate) async fn sorted_children(
    dir: &Path,
) -> Result<Vec<std::path::PathBuf>, hops_errors::CleanupError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| scan_err(dir, &e))?;
    let mut children = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| scan_err(dir, &e))? {
        children.push(entry.path());
    }
    children.sort();
    Ok(children)
}
