//! CLI error handling

use std::fmt;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Error surfaced from one of the hops crates
    Hops(hops_errors::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Hops(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Hops(e) => Some(e),
        }
    }
}

impl From<hops_errors::Error> for CliError {
    fn from(e: hops_errors::Error) -> Self {
        CliError::Hops(e)
    }
}

impl From<hops_errors::CommandError> for CliError {
    fn from(e: hops_errors::CommandError) -> Self {
        CliError::Hops(e.into())
    }
}

impl From<hops_errors::MachOError> for CliError {
    fn from(e: hops_errors::MachOError) -> Self {
        CliError::Hops(e.into())
    }
}

