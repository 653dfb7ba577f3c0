//! In-process structural Mach-O backend

mod edit;
mod layout;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use hops_errors::MachOError;
use tracing::debug;

use crate::arch::{BinarySlice, LinkMetadata};
use crate::backend::{emit_finished, emit_started, MachOBackend, OpContext};
use crate::reader::Reader;

use layout::{display, dylib_name, is_load_dylib, LC_ID_DYLIB};

/// Parses and edits binaries directly, no external tools involved.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend {
    reader: Reader,
    strict: bool,
}

impl NativeBackend {
    #[must_use]
    pub fn new(strict: bool) -> Self {
        Self {
            reader: Reader::strict(strict),
            strict,
        }
    }

    async fn read_file(path: &Path) -> Result<Vec<u8>, MachOError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| MachOError::io(path.display().to_string(), &e))
    }

    async fn write_file(path: &Path, data: &[u8]) -> Result<(), MachOError> {
        tokio::fs::write(path, data)
            .await
            .map_err(|e| MachOError::io(path.display().to_string(), &e))
    }

    fn metadata_from(&self, path: &Path, data: &[u8]) -> Result<LinkMetadata, MachOError> {
        let regions = layout::slice_regions(path, data)?;
        let Some(&(base, size)) = regions.first() else {
            return Ok(LinkMetadata::default());
        };
        // Fat binaries: metadata comes from the first slice, matching the
        // external backend's first-architecture otool section.
        let slice = layout::parse_slice(path, data, base, size)?;
        layout::slice_metadata(path, data, &slice)
    }

    /// Rewrite the LC_ID_DYLIB string of every slice that has one.
    fn rewrite_dylib_id(
        path: &Path,
        data: &mut [u8],
        new_id: &str,
    ) -> Result<usize, MachOError> {
        let regions = layout::slice_regions(path, data)?;
        let mut rewritten = 0;
        for (base, size) in regions {
            let slice = layout::parse_slice(path, data, base, size)?;
            if let Some(cref) = slice.commands.iter().find(|c| c.cmd == LC_ID_DYLIB) {
                edit::rewrite_dylib_string(path, data, &slice, cref, new_id)?;
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }

    /// Occurrences of `old` among the linked-library commands of any slice.
    fn count_install_name(path: &Path, data: &[u8], old: &str) -> Result<usize, MachOError> {
        let regions = layout::slice_regions(path, data)?;
        let mut count = 0;
        for (base, size) in regions {
            let slice = layout::parse_slice(path, data, base, size)?;
            for cref in &slice.commands {
                if is_load_dylib(cref.cmd) && dylib_name(path, data, &slice, cref)? == old {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Rewrite every load command recording `old` to record `new`. Each
    /// rewrite shifts the commands after it, so the slice is re-parsed
    /// between edits rather than reusing stale offsets.
    fn rewrite_install_name(
        path: &Path,
        data: &mut [u8],
        old: &str,
        new: &str,
    ) -> Result<usize, MachOError> {
        let regions = layout::slice_regions(path, data)?;
        let mut rewritten = 0;
        for (base, size) in regions {
            loop {
                let slice = layout::parse_slice(path, data, base, size)?;
                let mut matched = None;
                for cref in &slice.commands {
                    if is_load_dylib(cref.cmd) && dylib_name(path, data, &slice, cref)? == old
                    {
                        matched = Some(cref.clone());
                        break;
                    }
                }
                let Some(cref) = matched else { break };
                edit::rewrite_dylib_string(path, data, &slice, &cref, new)?;
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }
}

#[async_trait]
impl MachOBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn slices(
        &self,
        _ctx: &OpContext,
        path: &Path,
    ) -> Result<Vec<BinarySlice>, MachOError> {
        // I/O failures surface as "could not determine" rather than an
        // error so sweeps stay resilient; strict mode keeps them loud.
        match Self::read_file(path).await {
            Ok(data) => self.reader.parse(path, &data),
            Err(e) if !self.strict => {
                debug!(error = %e, "swallowing read failure during classification");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn link_metadata(
        &self,
        ctx: &OpContext,
        path: &Path,
    ) -> Result<LinkMetadata, MachOError> {
        let started = emit_started(ctx, "link_metadata", path, HashMap::new());
        let data = Self::read_file(path).await?;
        let result = match self.metadata_from(path, &data) {
            Err(MachOError::Malformed { path, message }) if !self.strict => {
                debug!(path, message, "swallowing malformed metadata read");
                Ok(LinkMetadata::default())
            }
            other => other,
        };
        emit_finished(ctx, "link_metadata", path, started, &result, vec![]);
        result
    }

    async fn change_dylib_id(
        &self,
        ctx: &OpContext,
        path: &Path,
        new_id: &str,
    ) -> Result<(), MachOError> {
        let context = HashMap::from([("new_id".to_string(), new_id.to_string())]);
        let started = emit_started(ctx, "change_dylib_id", path, context);

        let result = async {
            let mut data = Self::read_file(path).await?;
            let rewritten = Self::rewrite_dylib_id(path, &mut data, new_id)?;
            if rewritten == 0 {
                return Err(MachOError::malformed(
                    display(path),
                    "no LC_ID_DYLIB load command",
                ));
            }
            Self::write_file(path, &data).await
        }
        .await;

        let changes = vec![format!("set dylib id to {new_id}")];
        emit_finished(ctx, "change_dylib_id", path, started, &result, changes);
        result
    }

    async fn change_install_name(
        &self,
        ctx: &OpContext,
        path: &Path,
        old: &str,
        new: &str,
    ) -> Result<(), MachOError> {
        let context = HashMap::from([
            ("old".to_string(), old.to_string()),
            ("new".to_string(), new.to_string()),
        ]);
        let started = emit_started(ctx, "change_install_name", path, context);

        let result = async {
            let mut data = Self::read_file(path).await?;
            let rewritten = if old == new {
                // A self-rename must still report a missing reference, but
                // rewriting would never terminate the match loop.
                Self::count_install_name(path, &data, old)?
            } else {
                Self::rewrite_install_name(path, &mut data, old, new)?
            };
            if rewritten == 0 {
                // The file on disk was never touched.
                return Err(MachOError::ReferenceNotFound {
                    path: display(path),
                    name: old.to_string(),
                });
            }
            Self::write_file(path, &data).await
        }
        .await;

        let changes = vec![format!("changed install name {old} -> {new}")];
        emit_finished(ctx, "change_install_name", path, started, &result, changes);
        result
    }
}
