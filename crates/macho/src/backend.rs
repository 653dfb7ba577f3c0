//! Backend capability interface and explicit strategy selection

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use async_trait::async_trait;
use hops_errors::MachOError;
use hops_events::{AppEvent, EventSender, RelocateEvent};
use serde::{Deserialize, Serialize};

use crate::arch::{BinarySlice, LinkMetadata};
use crate::cctools::CctoolsBackend;
use crate::checked::CheckedBackend;
use crate::native::NativeBackend;

/// Context for backend operations, carrying the event channel.
#[derive(Debug, Default)]
pub struct OpContext {
    event_sender: Option<EventSender>,
}

impl OpContext {
    #[must_use]
    pub fn new(event_sender: Option<EventSender>) -> Self {
        Self { event_sender }
    }

    pub fn emit(&self, event: AppEvent) {
        hops_events::emit(self.event_sender.as_ref(), event);
    }
}

/// Capability interface implemented by every Mach-O backend.
///
/// Mutating operations are not safe to run concurrently on the same file;
/// the caller serializes access per path.
#[async_trait]
pub trait MachOBackend: Send + Sync {
    /// Short backend name used in events and mismatch reports.
    fn name(&self) -> &'static str;

    /// Classify every slice of the binary, in on-disk order.
    async fn slices(&self, ctx: &OpContext, path: &Path)
        -> Result<Vec<BinarySlice>, MachOError>;

    /// Dylib id and ordered linked-library install names.
    async fn link_metadata(
        &self,
        ctx: &OpContext,
        path: &Path,
    ) -> Result<LinkMetadata, MachOError>;

    /// Rewrite the binary's own dylib id in place.
    async fn change_dylib_id(
        &self,
        ctx: &OpContext,
        path: &Path,
        new_id: &str,
    ) -> Result<(), MachOError>;

    /// Rewrite one recorded install name in place. `ReferenceNotFound` when
    /// `old` is absent, leaving the file byte-identical.
    async fn change_install_name(
        &self,
        ctx: &OpContext,
        path: &Path,
        old: &str,
        new: &str,
    ) -> Result<(), MachOError>;
}

/// Which backend implementation to construct.
///
/// Always an explicit value injected at construction (config or CLI flag),
/// never ambient global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendStrategy {
    /// In-process structural parser and editor
    #[default]
    Native,
    /// `otool` / `install_name_tool` external-process strategy
    ExternalTool,
    /// Both backends, cross-checked byte-for-byte
    Verified,
}

impl BackendStrategy {
    /// Construct the backend this strategy names. `strict` selects the
    /// developer-mode parse policy of the structural reader.
    #[must_use]
    pub fn create(self, strict: bool) -> Box<dyn MachOBackend> {
        match self {
            Self::Native => Box::new(NativeBackend::new(strict)),
            Self::ExternalTool => Box::new(CctoolsBackend::new()),
            Self::Verified => Box::new(CheckedBackend::new(
                Box::new(NativeBackend::new(strict)),
                Box::new(CctoolsBackend::new()),
            )),
        }
    }
}

impl BackendStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::ExternalTool => "external-tool",
            Self::Verified => "verified",
        }
    }
}

impl fmt::Display for BackendStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(Self::Native),
            "external-tool" | "cctools" => Ok(Self::ExternalTool),
            "verified" | "checked" => Ok(Self::Verified),
            other => Err(format!(
                "unknown backend strategy '{other}' (expected native, external-tool or verified)"
            )),
        }
    }
}

/// Emit the started event for a binary operation.
pub(crate) fn emit_started(
    ctx: &OpContext,
    operation: &str,
    path: &Path,
    context: HashMap<String, String>,
) -> Instant {
    ctx.emit(AppEvent::Relocate(RelocateEvent::OperationStarted {
        operation: operation.to_string(),
        binary_path: path.display().to_string(),
        context,
    }));
    Instant::now()
}

/// Emit the completed or failed event matching `result`.
pub(crate) fn emit_finished<T>(
    ctx: &OpContext,
    operation: &str,
    path: &Path,
    started: Instant,
    result: &Result<T, MachOError>,
    changes_made: Vec<String>,
) {
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let binary_path = path.display().to_string();
    match result {
        Ok(_) => ctx.emit(AppEvent::Relocate(RelocateEvent::OperationCompleted {
            operation: operation.to_string(),
            binary_path,
            changes_made,
            duration_ms,
        })),
        Err(e) => ctx.emit(AppEvent::Relocate(RelocateEvent::OperationFailed {
            operation: operation.to_string(),
            binary_path,
            error_message: e.to_string(),
            duration_ms,
        })),
    }
}
