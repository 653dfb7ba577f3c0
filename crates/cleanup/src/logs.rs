//! Build log sweep

use hops_errors::Error;

use crate::cache::{is_dir, sorted_children};
use crate::{Cleaner, CleanupReport, Prune};

impl Cleaner {
    /// Remove per-package log directories untouched past the retention
    /// window.
    pub(crate) async fn sweep_logs(&self) -> Result<CleanupReport, Error> {
        let mut report = CleanupReport::default();
        if !is_dir(&self.logs).await {
            return Ok(report);
        }

        let threshold = Prune::Days(self.log_retention_days);
        for path in sorted_children(&self.logs).await? {
            if !is_dir(&path).await {
                continue;
            }
            let stale = tokio::fs::metadata(&path)
                .await
                .and_then(|meta| meta.modified())
                .is_ok_and(|modified| threshold.is_stale(modified, self.now));
            if stale {
                self.remove_path(&path, &mut report).await?;
            }
        }
        Ok(report)
    }
}
