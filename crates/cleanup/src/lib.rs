#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Cache, cellar, log and lockfile sweeps for hops
//!
//! The sweeps mirror what a maintainer would do by hand: drop half-finished
//! downloads, artifacts superseded by what is installed in the cellar, old
//! keg versions, stale build logs and abandoned lockfiles. Every removal is
//! reported through the event channel, and `--dry-run` reports without
//! touching the filesystem.

mod cache;
mod cellar;
mod ds_store;
mod lockfiles;
mod logs;
mod prune;
mod util;
mod version;

pub use prune::Prune;

use std::path::PathBuf;
use std::time::SystemTime;

use hops_errors::Error;
use hops_events::{AppEvent, CleanupEvent, EventSender};

/// Aggregate result of one cleanup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub paths_removed: usize,
    pub reclaimed_bytes: u64,
}

impl CleanupReport {
    fn absorb(&mut self, other: Self) {
        self.paths_removed += other.paths_removed;
        self.reclaimed_bytes += other.reclaimed_bytes;
    }
}

/// Filesystem sweeper over the cache, cellar, log and prefix trees.
pub struct Cleaner {
    cache: PathBuf,
    cellar: PathBuf,
    logs: PathBuf,
    prefix: PathBuf,
    dry_run: bool,
    prune: Option<Prune>,
    scrub: bool,
    scratch_dirs: Vec<String>,
    log_retention_days: u32,
    now: SystemTime,
    event_sender: Option<EventSender>,
}

impl Cleaner {
    #[must_use]
    pub fn new(cache: PathBuf, cellar: PathBuf, logs: PathBuf, prefix: PathBuf) -> Self {
        Self {
            cache,
            cellar,
            logs,
            prefix,
            dry_run: false,
            prune: None,
            scrub: false,
            scratch_dirs: vec!["java_cache".to_string(), "npm_cache".to_string()],
            log_retention_days: 14,
            now: SystemTime::now(),
            event_sender: None,
        }
    }

    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Age threshold for cache entries; without one, cache entries are only
    /// removed when superseded.
    #[must_use]
    pub fn prune(mut self, prune: Option<Prune>) -> Self {
        self.prune = prune;
        self
    }

    /// Also remove cached artifacts of packages no longer installed.
    #[must_use]
    pub fn scrub(mut self, scrub: bool) -> Self {
        self.scrub = scrub;
        self
    }

    #[must_use]
    pub fn scratch_dirs(mut self, dirs: Vec<String>) -> Self {
        self.scratch_dirs = dirs;
        self
    }

    #[must_use]
    pub fn log_retention_days(mut self, days: u32) -> Self {
        self.log_retention_days = days;
        self
    }

    #[must_use]
    pub fn event_sender(mut self, sender: Option<EventSender>) -> Self {
        self.event_sender = sender;
        self
    }

    #[cfg(test)]
    fn at_time(mut self, now: SystemTime) -> Self {
        self.now = now;
        self
    }

    /// Run every sweep and report the combined result.
    ///
    /// Lockfile and `.DS_Store` sweeps mutate without a meaningful preview,
    /// so they are skipped entirely in dry-run.
    ///
    /// # Errors
    ///
    /// Fails when a directory cannot be scanned or an eligible path cannot
    /// be removed.
    pub async fn run(&self) -> Result<CleanupReport, Error> {
        let mut report = CleanupReport::default();
        report.absorb(self.sweep_cellar().await?);
        report.absorb(self.sweep_cache().await?);
        report.absorb(self.sweep_logs().await?);
        if !self.dry_run {
            report.absorb(self.sweep_lockfiles().await?);
            self.sweep_ds_store().await?;
        }

        self.emit(CleanupEvent::Completed {
            paths_removed: report.paths_removed,
            reclaimed_bytes: report.reclaimed_bytes,
            dry_run: self.dry_run,
        });
        Ok(report)
    }

    fn emit(&self, event: CleanupEvent) {
        hops_events::emit(self.event_sender.as_ref(), AppEvent::Cleanup(event));
    }
}
