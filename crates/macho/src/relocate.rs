//! Keg relocation: rewrite prefix references after an install moves

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hops_errors::{Error, MachOError};
use hops_events::{AppEvent, RelocateEvent};
use tracing::{debug, warn};

use crate::arch::BinaryKind;
use crate::backend::{MachOBackend, OpContext};

/// What a relocation pass did to one keg.
#[derive(Debug, Clone, Default)]
pub struct RelocationReport {
    pub files_scanned: usize,
    pub files_changed: usize,
    pub changes: Vec<String>,
}

/// Walks a keg and rewrites every dylib id and install name that points at
/// the old prefix. Each file's edits run to completion before the next file
/// starts; nothing here locks, so callers must not relocate the same keg
/// concurrently.
pub struct Relocator {
    backend: Arc<dyn MachOBackend>,
    continue_on_error: bool,
}

impl Relocator {
    #[must_use]
    pub fn new(backend: Arc<dyn MachOBackend>) -> Self {
        Self {
            backend,
            continue_on_error: false,
        }
    }

    /// Keep going past per-file editor errors. A `BackendMismatch` still
    /// aborts the walk regardless of this setting.
    #[must_use]
    pub fn continue_on_error(mut self, yes: bool) -> Self {
        self.continue_on_error = yes;
        self
    }

    /// Relocate every Mach-O file under `keg` from `old_prefix` to
    /// `new_prefix`.
    ///
    /// # Errors
    /// Propagates editor errors (unless `continue_on_error`), walk failures,
    /// and always any `BackendMismatch`.
    pub async fn relocate_keg(
        &self,
        ctx: &OpContext,
        keg: &Path,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<RelocationReport, Error> {
        let mut report = RelocationReport::default();

        for file in collect_files(keg).await? {
            report.files_scanned += 1;
            match self.relocate_file(ctx, &file, old_prefix, new_prefix).await {
                Ok(changes) if changes.is_empty() => {}
                Ok(mut changes) => {
                    report.files_changed += 1;
                    report.changes.append(&mut changes);
                }
                Err(e) if e.is_fatal() || !self.continue_on_error => {
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "skipping file after edit failure");
                }
            }
        }

        ctx.emit(AppEvent::Relocate(RelocateEvent::KegRelocated {
            keg_path: keg.display().to_string(),
            files_changed: report.files_changed,
        }));
        Ok(report)
    }

    async fn relocate_file(
        &self,
        ctx: &OpContext,
        file: &Path,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<Vec<String>, MachOError> {
        let slices = match self.backend.slices(ctx, file).await {
            Ok(slices) => slices,
            // Opaque/non-binary files are simply not candidates.
            Err(MachOError::NotMachO { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        if slices.is_empty() {
            debug!(file = %file.display(), "could not classify, leaving untouched");
            return Ok(Vec::new());
        }

        let metadata = self.backend.link_metadata(ctx, file).await?;
        let mut changes = Vec::new();

        let is_dylib = slices.iter().any(|s| s.kind == BinaryKind::Dylib);
        if is_dylib {
            if let Some(id) = &metadata.dylib_id {
                if let Some(new_id) = swap_prefix(id, old_prefix, new_prefix) {
                    self.backend.change_dylib_id(ctx, file, &new_id).await?;
                    changes.push(format!("{}: id {id} -> {new_id}", file.display()));
                }
            }
        }

        for lib in &metadata.linked_libraries {
            if let Some(new_lib) = swap_prefix(lib, old_prefix, new_prefix) {
                self.backend
                    .change_install_name(ctx, file, lib, &new_lib)
                    .await?;
                changes.push(format!("{}: {lib} -> {new_lib}", file.display()));
            }
        }

        Ok(changes)
    }
}

fn swap_prefix(name: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    name.strip_prefix(old_prefix)
        .map(|rest| format!("{new_prefix}{rest}"))
}

/// Regular files under `root`, depth-first, symlinks not followed.
async fn collect_files(root: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| Error::io_with_path(&e, &dir))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io_with_path(&e, &dir))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::io_with_path(&e, entry.path()))?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}
