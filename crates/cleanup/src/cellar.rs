//! Cellar sweep: outdated keg version directories

use hops_errors::Error;

use crate::cache::{is_dir, sorted_children};
use crate::version::compare_versions;
use crate::{Cleaner, CleanupReport};

impl Cleaner {
    /// Remove every keg version directory older than the newest one of its
    /// package. Packages with a single keg are untouched.
    pub(crate) async fn sweep_cellar(&self) -> Result<CleanupReport, Error> {
        let mut report = CleanupReport::default();
        if !is_dir(&self.cellar).await {
            return Ok(report);
        }

        for rack in sorted_children(&self.cellar).await? {
            if !is_dir(&rack).await {
                continue;
            }

            let mut kegs = Vec::new();
            for keg in sorted_children(&rack).await? {
                if !is_dir(&keg).await {
                    continue;
                }
                if let Some(version) = keg.file_name().and_then(|n| n.to_str()) {
                    kegs.push((version.to_string(), keg));
                }
            }

            let Some(newest) = kegs
                .iter()
                .map(|(version, _)| version.clone())
                .max_by(|a, b| compare_versions(a, b))
            else {
                continue;
            };

            for (version, keg) in kegs {
                if version == newest {
                    continue;
                }
                self.remove_path(&keg, &mut report).await?;
            }
        }
        Ok(report)
    }
}
