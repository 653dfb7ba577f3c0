//! Mach-O parsing, relocation and backend verification errors

use thiserror::Error;

/// Errors from the Mach-O reader, editors and the checked backend.
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum MachOError {
    /// The file's leading magic matches no known thin or fat Mach-O magic,
    /// or a fat record points at bytes that carry no Mach-O magic.
    /// Recoverable: the caller should treat the file as opaque.
    #[error("not a Mach-O binary: {path}")]
    NotMachO { path: String },

    /// Mach-O-tagged input that could not be parsed further (truncated
    /// headers, load commands running past the buffer). Swallowed to an
    /// empty slice list by the lenient reader, surfaced in strict mode.
    #[error("malformed Mach-O binary {path}: {message}")]
    Malformed { path: String, message: String },

    /// `change_install_name` found no linked-library command recording `old`.
    #[error("install name {name} not found in {path}")]
    ReferenceNotFound { path: String, name: String },

    /// A rewritten load-command string does not fit in the space before the
    /// first section's file offset (the headerpad is exhausted).
    #[error("load commands do not fit in {path}: {message}")]
    LoadCommandSpace { path: String, message: String },

    /// An external tool invocation failed.
    #[error("{command} failed on {path}: {message}")]
    ToolFailed {
        command: String,
        path: String,
        message: String,
    },

    /// Two independent backends disagree on a read result or on the content
    /// hash after a mutation. Fatal: this is a backend bug, never retried or
    /// silently resolved.
    #[error(
        "backend mismatch in {operation} on {path}: primary={primary} secondary={secondary}"
    )]
    BackendMismatch {
        operation: String,
        path: String,
        primary: String,
        secondary: String,
    },

    /// I/O failure while reading or mutating a binary.
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
}

impl MachOError {
    pub fn io(path: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn malformed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// `BackendMismatch` is the one variant that must never be downgraded
    /// or retried.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::BackendMismatch { .. })
    }
}
