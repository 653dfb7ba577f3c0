#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for the hops package maintenance tool
//!
//! This crate provides fine-grained error types organized by domain.
//! All error types implement Clone where possible for easier handling.

use thiserror::Error;

pub mod cleanup;
pub mod command;
pub mod config;
pub mod macho;

// Re-export all error types at the root
pub use cleanup::CleanupError;
pub use command::CommandError;
pub use config::ConfigError;
pub use macho::MachOError;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    #[error("macho error: {0}")]
    MachO(#[from] MachOError),

    #[error("cleanup error: {0}")]
    Cleanup(#[from] CleanupError),

    #[error("command error: {0}")]
    Command(#[from] CommandError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {message}")]
    Io {
        #[cfg_attr(feature = "serde", serde(with = "io_kind_as_str"))]
        kind: std::io::ErrorKind,
        message: String,
        #[cfg_attr(feature = "serde", serde(skip))]
        path: Option<std::path::PathBuf>,
    },
}

impl Error {
    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an Io error with an associated path
    pub fn io_with_path(err: &std::io::Error, path: impl Into<std::path::PathBuf>) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: Some(path.into()),
        }
    }

    /// `true` when this error must abort the surrounding sweep even if the
    /// caller asked to continue on per-file failures.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MachO(MachOError::BackendMismatch { .. }) | Self::Internal(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: None,
        }
    }
}

#[cfg(feature = "serde")]
mod io_kind_as_str {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        kind: &std::io::ErrorKind,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&format!("{kind:?}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<std::io::ErrorKind, D::Error> {
        let _ = String::deserialize(de)?;
        Ok(std::io::ErrorKind::Other)
    }
}
