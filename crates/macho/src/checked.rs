//! Cross-checked execution of two independent backends
//!
//! Migration insurance: every read runs through both backends and must agree
//! structurally; every mutation is applied twice against the same pristine
//! bytes and must produce identical content hashes. Disagreement is a
//! backend bug and always fails, never a recoverable condition.

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use hops_errors::MachOError;
use hops_hash::Hash;
use tracing::error;

use crate::arch::{BinarySlice, LinkMetadata};
use crate::backend::{MachOBackend, OpContext};

/// Runs a primary and a secondary backend in lockstep.
///
/// Reads return the primary's value; mutations leave the primary's bytes on
/// disk. The mutating flow is strictly sequential: snapshot, apply
/// secondary, hash, restore, apply primary, hash, compare.
pub struct CheckedBackend {
    primary: Box<dyn MachOBackend>,
    secondary: Box<dyn MachOBackend>,
}

/// One mutating operation, replayed verbatim against each backend.
enum Edit<'a> {
    DylibId { new_id: &'a str },
    InstallName { old: &'a str, new: &'a str },
}

impl Edit<'_> {
    fn operation(&self) -> &'static str {
        match self {
            Self::DylibId { .. } => "change_dylib_id",
            Self::InstallName { .. } => "change_install_name",
        }
    }

    async fn apply(
        &self,
        backend: &dyn MachOBackend,
        ctx: &OpContext,
        path: &Path,
    ) -> Result<(), MachOError> {
        match self {
            Self::DylibId { new_id } => backend.change_dylib_id(ctx, path, new_id).await,
            Self::InstallName { old, new } => {
                backend.change_install_name(ctx, path, old, new).await
            }
        }
    }
}

impl CheckedBackend {
    #[must_use]
    pub fn new(primary: Box<dyn MachOBackend>, secondary: Box<dyn MachOBackend>) -> Self {
        Self { primary, secondary }
    }

    fn mismatch<T: Debug>(
        &self,
        operation: &str,
        path: &Path,
        primary: &T,
        secondary: &T,
    ) -> MachOError {
        let err = MachOError::BackendMismatch {
            operation: operation.to_string(),
            path: path.display().to_string(),
            primary: format!("{primary:?}"),
            secondary: format!("{secondary:?}"),
        };
        error!(
            operation,
            path = %path.display(),
            primary_backend = self.primary.name(),
            secondary_backend = self.secondary.name(),
            "backend mismatch: {err}"
        );
        err
    }

    fn compare_read<T: PartialEq + Debug>(
        &self,
        operation: &str,
        path: &Path,
        primary: T,
        secondary: &T,
    ) -> Result<T, MachOError> {
        if primary == *secondary {
            Ok(primary)
        } else {
            Err(self.mismatch(operation, path, &primary, secondary))
        }
    }

    /// Snapshot / apply / hash / restore / apply / hash / compare.
    async fn verify_mutation(
        &self,
        ctx: &OpContext,
        path: &Path,
        edit: Edit<'_>,
    ) -> Result<(), MachOError> {
        let snapshot = tokio::fs::read(path)
            .await
            .map_err(|e| MachOError::io(path.display().to_string(), &e))?;

        edit.apply(self.secondary.as_ref(), ctx, path).await?;
        let secondary_hash = Hash::hash_file(path)
            .await
            .map_err(|e| MachOError::io(path.display().to_string(), &to_io(e)))?;

        // Restore the pristine bytes so the primary mutates the same input
        // the secondary did.
        tokio::fs::write(path, &snapshot)
            .await
            .map_err(|e| MachOError::io(path.display().to_string(), &e))?;

        edit.apply(self.primary.as_ref(), ctx, path).await?;
        let primary_hash = Hash::hash_file(path)
            .await
            .map_err(|e| MachOError::io(path.display().to_string(), &to_io(e)))?;

        if primary_hash == secondary_hash {
            Ok(())
        } else {
            Err(self.mismatch(
                edit.operation(),
                path,
                &primary_hash.to_hex(),
                &secondary_hash.to_hex(),
            ))
        }
    }
}

fn to_io(err: hops_errors::Error) -> std::io::Error {
    std::io::Error::other(err.to_string())
}

#[async_trait]
impl MachOBackend for CheckedBackend {
    fn name(&self) -> &'static str {
        "checked"
    }

    async fn slices(
        &self,
        ctx: &OpContext,
        path: &Path,
    ) -> Result<Vec<BinarySlice>, MachOError> {
        let primary = self.primary.slices(ctx, path).await?;
        let secondary = self.secondary.slices(ctx, path).await?;
        self.compare_read("slices", path, primary, &secondary)
    }

    async fn link_metadata(
        &self,
        ctx: &OpContext,
        path: &Path,
    ) -> Result<LinkMetadata, MachOError> {
        let primary = self.primary.link_metadata(ctx, path).await?;
        let secondary = self.secondary.link_metadata(ctx, path).await?;
        self.compare_read("link_metadata", path, primary, &secondary)
    }

    async fn change_dylib_id(
        &self,
        ctx: &OpContext,
        path: &Path,
        new_id: &str,
    ) -> Result<(), MachOError> {
        self.verify_mutation(ctx, path, Edit::DylibId { new_id }).await
    }

    async fn change_install_name(
        &self,
        ctx: &OpContext,
        path: &Path,
        old: &str,
        new: &str,
    ) -> Result<(), MachOError> {
        self.verify_mutation(ctx, path, Edit::InstallName { old, new })
            .await
    }
}
