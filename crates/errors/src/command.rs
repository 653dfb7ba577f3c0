//! Command registry error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum CommandError {
    #[error("unknown command: {name}")]
    UnknownCommand { name: String },

    #[error("this command requires a command argument")]
    MissingArgument,

    #[error("failed to scan command path {path}: {message}")]
    ScanFailed { path: String, message: String },
}
