//! Age thresholds for cache and log sweeps

use std::str::FromStr;
use std::time::{Duration, SystemTime};

use hops_errors::CleanupError;

const SECONDS_PER_DAY: u64 = 60 * 60 * 24;

/// Parsed `--prune` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prune {
    /// Entries untouched for at least this many days.
    Days(u32),
    /// Every entry, regardless of age.
    All,
}

impl Prune {
    /// Whether a path last modified at `modified` is past the threshold,
    /// measured from `now`.
    #[must_use]
    pub fn is_stale(self, modified: SystemTime, now: SystemTime) -> bool {
        match self {
            Self::All => true,
            Self::Days(days) => {
                let age = Duration::from_secs(u64::from(days) * SECONDS_PER_DAY);
                now.checked_sub(age).is_some_and(|cutoff| modified < cutoff)
            }
        }
    }
}

impl FromStr for Prune {
    type Err = CleanupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(Self::All);
        }
        s.parse::<u32>()
            .map(Self::Days)
            .map_err(|_| CleanupError::InvalidPrune {
                value: s.to_string(),
            })
    }
}
