//! External-process backend over `otool` and `install_name_tool`
//!
//! Classification walks the raw header words itself (fat framing is always
//! big-endian; thin header fields follow the byte order the magic selects)
//! and routes cputype/filetype through the same table as the structural
//! backend so checked mode never diverges on naming. Metadata is scraped
//! from `otool -L` output and edits go through `install_name_tool`.
//! Pre-checks keep its error behavior aligned with the structural backend
//! (`install_name_tool -change` is a silent no-op for a missing reference;
//! the contract requires `ReferenceNotFound`).

use std::collections::HashMap;
use std::path::Path;
use std::process::Output;

use async_trait::async_trait;
use hops_errors::MachOError;
use tokio::process::Command;
use tracing::debug;

use crate::arch::{BinaryKind, BinarySlice, LinkMetadata};
use crate::backend::{emit_finished, emit_started, MachOBackend, OpContext};
use crate::reader::{
    classify_arch, classify_kind, read_u32, read_u32_be, ThinFormat, FAT_MAGIC,
};

/// Shells out to the Xcode command-line tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct CctoolsBackend;

impl CctoolsBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn run_tool(
        tool: &str,
        args: &[&str],
        path: &Path,
    ) -> Result<Output, MachOError> {
        debug!(tool, ?args, "running external tool");
        Command::new(tool)
            .args(args)
            .output()
            .await
            .map_err(|e| MachOError::ToolFailed {
                command: tool.to_string(),
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }

    async fn install_name_tool(path: &Path, args: &[&str]) -> Result<(), MachOError> {
        let output = Self::run_tool("install_name_tool", args, path).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("larger updated load commands do not fit") {
            return Err(MachOError::LoadCommandSpace {
                path: path.display().to_string(),
                message: stderr.trim().to_string(),
            });
        }
        Err(MachOError::ToolFailed {
            command: "install_name_tool".to_string(),
            path: path.display().to_string(),
            message: stderr.trim().to_string(),
        })
    }

    /// Raw-word classification of the slice at `offset`.
    ///
    /// The magic selects the byte order; cputype and filetype are decoded in
    /// that order and classified through the shared table.
    fn classify_raw(data: &[u8], offset: usize) -> Option<BinarySlice> {
        let magic = read_u32_be(data, offset)?;
        let format = ThinFormat::from_magic(magic)?;
        let cputype = read_u32(data, offset + 4, format.little_endian)?;
        let filetype = read_u32(data, offset + 12, format.little_endian)?;
        Some(BinarySlice::new(
            classify_arch(cputype),
            classify_kind(filetype),
        ))
    }

    fn parse_slices(path: &Path, data: &[u8]) -> Result<Vec<BinarySlice>, MachOError> {
        let not_macho = || MachOError::NotMachO {
            path: path.display().to_string(),
        };

        let magic = read_u32_be(data, 0).ok_or_else(not_macho)?;
        let offsets: Vec<usize> = if magic == FAT_MAGIC {
            let count = read_u32_be(data, 4).ok_or_else(|| {
                MachOError::malformed(path.display().to_string(), "truncated fat header")
            })?;
            // Bound the untrusted count before collecting into it.
            if (count as usize)
                .checked_mul(20)
                .and_then(|len| len.checked_add(8))
                .is_none_or(|end| end > data.len())
            {
                return Err(MachOError::malformed(
                    path.display().to_string(),
                    "fat header count exceeds file size",
                ));
            }
            // Each fat_arch record is 20 bytes; its offset member begins
            // 8 bytes in, after the 8-byte fat header.
            (0..count as usize)
                .map(|i| {
                    read_u32_be(data, 20 * i + 16).map(|o| o as usize).ok_or_else(|| {
                        MachOError::malformed(
                            path.display().to_string(),
                            "truncated fat arch record",
                        )
                    })
                })
                .collect::<Result<_, _>>()?
        } else if ThinFormat::from_magic(magic).is_some() {
            vec![0]
        } else {
            return Err(not_macho());
        };

        let mut slices = Vec::with_capacity(offsets.len());
        for offset in offsets {
            match Self::classify_raw(data, offset) {
                Some(slice) => slices.push(slice),
                // Fat header over non-Mach-O members: a static archive.
                None => return Err(not_macho()),
            }
        }
        Ok(slices)
    }

    /// Parse `otool -L` output: the first line names the file, every
    /// following tab-indented line is one entry. For fat binaries only the
    /// first architecture section is taken (a following non-indented line
    /// starts the next one), matching the structural backend's first-slice
    /// metadata.
    fn parse_otool_libs(stdout: &str) -> Vec<String> {
        let mut libs = Vec::new();
        for line in stdout.lines().skip(1) {
            if !line.starts_with('\t') {
                break;
            }
            let entry = line.trim_start();
            let name = entry
                .split_once(" (compatibility version")
                .map_or(entry, |(name, _)| name)
                .trim_end();
            if !name.is_empty() {
                libs.push(name.to_string());
            }
        }
        libs
    }

    async fn read_metadata(&self, path: &Path) -> Result<LinkMetadata, MachOError> {
        let is_dylib = match self.classify_file(path).await {
            Ok(slices) => slices.first().is_some_and(|s| s.kind == BinaryKind::Dylib),
            Err(MachOError::NotMachO { .. }) => false,
            Err(e) => return Err(e),
        };

        let path_arg = path.display().to_string();
        let output = Self::run_tool("otool", &["-L", &path_arg], path).await?;
        if !output.status.success() {
            return Err(MachOError::ToolFailed {
                command: "otool -L".to_string(),
                path: path_arg,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut entries = Self::parse_otool_libs(&stdout);

        let dylib_id = if is_dylib && !entries.is_empty() {
            Some(entries.remove(0))
        } else {
            None
        };

        Ok(LinkMetadata {
            dylib_id,
            linked_libraries: entries,
        })
    }

    async fn classify_file(&self, path: &Path) -> Result<Vec<BinarySlice>, MachOError> {
        match tokio::fs::read(path).await {
            Ok(data) => Self::parse_slices(path, &data),
            Err(e) => Err(MachOError::io(path.display().to_string(), &e)),
        }
    }
}

#[async_trait]
impl MachOBackend for CctoolsBackend {
    fn name(&self) -> &'static str {
        "cctools"
    }

    async fn slices(
        &self,
        _ctx: &OpContext,
        path: &Path,
    ) -> Result<Vec<BinarySlice>, MachOError> {
        match self.classify_file(path).await {
            err @ Err(MachOError::NotMachO { .. }) => err,
            Err(e) => {
                debug!(error = %e, "swallowing read failure during classification");
                Ok(Vec::new())
            }
            ok => ok,
        }
    }

    async fn link_metadata(
        &self,
        ctx: &OpContext,
        path: &Path,
    ) -> Result<LinkMetadata, MachOError> {
        let started = emit_started(ctx, "link_metadata", path, HashMap::new());
        let result = self.read_metadata(path).await;
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
            let metadata = self.read_metadata(path).await?;
            if metadata.dylib_id.is_none() {
                return Err(MachOError::malformed(
                    path.display().to_string(),
                    "no LC_ID_DYLIB load command",
                ));
            }
            let path_arg = path.display().to_string();
            Self::install_name_tool(path, &["-id", new_id, &path_arg]).await
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
            let metadata = self.read_metadata(path).await?;
            if !metadata.linked_libraries.iter().any(|l| l == old) {
                return Err(MachOError::ReferenceNotFound {
                    path: path.display().to_string(),
                    name: old.to_string(),
                });
            }
            let path_arg = path.display().to_string();
            Self::install_name_tool(path, &["-change", old, new, &path_arg]).await
        }
        .await;

        let changes = vec![format!("changed install name {old} -> {new}")];
        emit_finished(ctx, "change_install_name", path, started, &result, changes);
        result
    }
}
