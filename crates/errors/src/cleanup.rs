//! Cache, cellar and log sweep error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum CleanupError {
    #[error("cache directory not found: {path}")]
    CacheNotFound { path: String },

    #[error("failed to remove {path}: {message}")]
    RemovalFailed { path: String, message: String },

    #[error("invalid prune value: {value} (expected a number of days or \"all\")")]
    InvalidPrune { value: String },

    #[error("failed to scan {path}: {message}")]
    ScanFailed { path: String, message: String },
}
