//! Configuration loading and validation errors

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    ReadFailed { path: String, message: String },

    #[error("invalid config file {path}: {message}")]
    ParseFailed { path: String, message: String },

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },
}
