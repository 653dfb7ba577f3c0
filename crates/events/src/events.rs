//! Domain event definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level application event, one variant per domain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum AppEvent {
    Relocate(RelocateEvent),
    Cleanup(CleanupEvent),
    General(GeneralEvent),
}

/// Binary relocation events (`otool`, `install_name_tool`, native editor)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum RelocateEvent {
    /// Binary operation started
    OperationStarted {
        /// Operation name (e.g. `change_dylib_id`, `linked_libraries`)
        operation: String,
        /// Path to the binary being operated on
        binary_path: String,
        /// Additional context for the operation
        context: HashMap<String, String>,
    },

    /// Binary operation completed successfully
    OperationCompleted {
        operation: String,
        binary_path: String,
        /// List of changes made during the operation
        changes_made: Vec<String>,
        duration_ms: u64,
    },

    /// Binary operation failed
    OperationFailed {
        operation: String,
        binary_path: String,
        error_message: String,
        duration_ms: u64,
    },

    /// A whole keg finished relocating
    KegRelocated {
        keg_path: String,
        files_changed: usize,
    },
}

/// Cache/cellar/log sweep events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum CleanupEvent {
    /// A path was (or, in dry-run, would be) removed
    PathRemoved {
        path: String,
        size_bytes: u64,
        dry_run: bool,
    },

    /// A candidate was inspected but kept
    PathSkipped { path: String, reason: String },

    /// Sweep finished
    Completed {
        paths_removed: usize,
        reclaimed_bytes: u64,
        dry_run: bool,
    },
}

/// General-purpose events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GeneralEvent {
    Message { text: String },
    Warning { text: String },
}
