//! Cross-checked backend tests: agreement passes values through, any
//! divergence between the two backends is a hard failure.

mod common;

use std::path::Path;

use async_trait::async_trait;
use common::{fat_binary, thin_binary, write_fixture, CPU_TYPE_ARM64, CPU_TYPE_X86_64};
use hops_errors::MachOError;
use hops_macho::{
    Arch, BinaryKind, BinarySlice, CctoolsBackend, CheckedBackend, LinkMetadata, MachOBackend,
    NativeBackend, OpContext,
};

/// Scripted backend: canned read answers, mutations rewrite the whole file.
struct StubBackend {
    name: &'static str,
    slices: Vec<BinarySlice>,
    metadata: LinkMetadata,
    mutation: Mutation,
}

enum Mutation {
    /// Replace the file with fixed bytes.
    Replace(&'static [u8]),
    /// Append a marker to whatever is on disk.
    Append(u8),
}

impl StubBackend {
    fn new(name: &'static str, mutation: Mutation) -> Self {
        Self {
            name,
            slices: vec![BinarySlice::new(Arch::Arm64, BinaryKind::Dylib)],
            metadata: LinkMetadata {
                dylib_id: Some("libstub.dylib".to_string()),
                linked_libraries: vec!["/usr/lib/libSystem.B.dylib".to_string()],
            },
            mutation,
        }
    }

    async fn mutate(&self, path: &Path) -> Result<(), MachOError> {
        let data = match &self.mutation {
            Mutation::Replace(bytes) => bytes.to_vec(),
            Mutation::Append(marker) => {
                let mut data = tokio::fs::read(path)
                    .await
                    .map_err(|e| MachOError::io(path.display().to_string(), &e))?;
                data.push(*marker);
                data
            }
        };
        tokio::fs::write(path, data)
            .await
            .map_err(|e| MachOError::io(path.display().to_string(), &e))
    }
}

#[async_trait]
impl MachOBackend for StubBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn slices(
        &self,
        _ctx: &OpContext,
        _path: &Path,
    ) -> Result<Vec<BinarySlice>, MachOError> {
        Ok(self.slices.clone())
    }

    async fn link_metadata(
        &self,
        _ctx: &OpContext,
        _path: &Path,
    ) -> Result<LinkMetadata, MachOError> {
        Ok(self.metadata.clone())
    }

    async fn change_dylib_id(
        &self,
        _ctx: &OpContext,
        path: &Path,
        _new_id: &str,
    ) -> Result<(), MachOError> {
        self.mutate(path).await
    }

    async fn change_install_name(
        &self,
        _ctx: &OpContext,
        path: &Path,
        _old: &str,
        _new: &str,
    ) -> Result<(), MachOError> {
        self.mutate(path).await
    }
}

fn checked(primary: StubBackend, secondary: StubBackend) -> CheckedBackend {
    CheckedBackend::new(Box::new(primary), Box::new(secondary))
}

#[tokio::test]
async fn agreeing_reads_pass_through() {
    let backend = checked(
        StubBackend::new("a", Mutation::Replace(b"same")),
        StubBackend::new("b", Mutation::Replace(b"same")),
    );
    let ctx = OpContext::default();
    let path = Path::new("unused.dylib");

    let slices = backend.slices(&ctx, path).await.unwrap();
    assert_eq!(slices, vec![BinarySlice::new(Arch::Arm64, BinaryKind::Dylib)]);

    let meta = backend.link_metadata(&ctx, path).await.unwrap();
    assert_eq!(meta.dylib_id.as_deref(), Some("libstub.dylib"));
}

#[tokio::test]
async fn diverging_reads_are_a_mismatch() {
    let mut second = StubBackend::new("b", Mutation::Replace(b""));
    second.slices = vec![BinarySlice::new(Arch::X86_64, BinaryKind::Dylib)];
    let backend = checked(StubBackend::new("a", Mutation::Replace(b"")), second);
    let ctx = OpContext::default();

    let err = backend.slices(&ctx, Path::new("x.dylib")).await.unwrap_err();
    assert!(matches!(
        err,
        MachOError::BackendMismatch { ref operation, .. } if operation == "slices"
    ));
    assert!(err.is_fatal());

    let mut second = StubBackend::new("b", Mutation::Replace(b""));
    second.metadata.linked_libraries.push("/extra.dylib".to_string());
    let backend = checked(StubBackend::new("a", Mutation::Replace(b"")), second);
    let err = backend
        .link_metadata(&ctx, Path::new("x.dylib"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MachOError::BackendMismatch { ref operation, .. } if operation == "link_metadata"
    ));
}

#[tokio::test]
async fn identical_mutations_verify_and_keep_result() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "f.dylib", b"original");
    let backend = checked(
        StubBackend::new("a", Mutation::Replace(b"rewritten")),
        StubBackend::new("b", Mutation::Replace(b"rewritten")),
    );
    let ctx = OpContext::default();

    backend
        .change_dylib_id(&ctx, &path, "libnew.dylib")
        .await
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"rewritten");
}

#[tokio::test]
async fn diverging_mutations_are_a_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "f.dylib", b"original");
    let backend = checked(
        StubBackend::new("a", Mutation::Replace(b"primary!")),
        StubBackend::new("b", Mutation::Replace(b"secondary")),
    );
    let ctx = OpContext::default();

    let err = backend
        .change_install_name(&ctx, &path, "/old.dylib", "/new.dylib")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MachOError::BackendMismatch { ref operation, .. } if operation == "change_install_name"
    ));
}

#[tokio::test]
async fn secondary_mutation_is_rolled_back_before_primary_runs() {
    // Appending backends only hash identically if the primary saw the
    // pristine snapshot, not the secondary's output.
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "f.dylib", b"base");
    let backend = checked(
        StubBackend::new("a", Mutation::Append(b'!')),
        StubBackend::new("b", Mutation::Append(b'!')),
    );
    let ctx = OpContext::default();

    backend
        .change_dylib_id(&ctx, &path, "libnew.dylib")
        .await
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"base!");
}

#[tokio::test]
async fn native_pair_verifies_a_real_edit() {
    let dir = tempfile::tempdir().unwrap();
    let data = thin_binary(
        CPU_TYPE_ARM64,
        Some("libfoo.dylib"),
        &["@@HOPS_PREFIX@@/lib/libbar.dylib"],
        256,
    );
    let path = write_fixture(dir.path(), "libfoo.dylib", &data);
    let backend = CheckedBackend::new(
        Box::new(NativeBackend::new(true)),
        Box::new(NativeBackend::new(true)),
    );
    let ctx = OpContext::default();

    backend
        .change_install_name(
            &ctx,
            &path,
            "@@HOPS_PREFIX@@/lib/libbar.dylib",
            "/opt/hops/lib/libbar.dylib",
        )
        .await
        .unwrap();

    let meta = backend.link_metadata(&ctx, &path).await.unwrap();
    assert_eq!(meta.linked_libraries, vec!["/opt/hops/lib/libbar.dylib"]);
}

#[tokio::test]
async fn classification_agrees_across_real_backends() {
    // The external backend's raw-word classifier and the structural reader
    // go through the same table; checked mode must see no divergence.
    let dir = tempfile::tempdir().unwrap();
    let thin = thin_binary(CPU_TYPE_ARM64, Some("libfoo.dylib"), &[], 64);
    let fat = fat_binary(&[
        (CPU_TYPE_X86_64, thin_binary(CPU_TYPE_X86_64, None, &[], 64)),
        (CPU_TYPE_ARM64, thin_binary(CPU_TYPE_ARM64, None, &[], 64)),
    ]);
    let backend = CheckedBackend::new(
        Box::new(NativeBackend::new(true)),
        Box::new(CctoolsBackend::new()),
    );
    let ctx = OpContext::default();

    let path = write_fixture(dir.path(), "thin.dylib", &thin);
    let slices = backend.slices(&ctx, &path).await.unwrap();
    assert_eq!(slices, vec![BinarySlice::new(Arch::Arm64, BinaryKind::Dylib)]);

    let path = write_fixture(dir.path(), "fat", &fat);
    let slices = backend.slices(&ctx, &path).await.unwrap();
    assert_eq!(
        slices,
        vec![
            BinarySlice::new(Arch::X86_64, BinaryKind::Executable),
            BinarySlice::new(Arch::Arm64, BinaryKind::Executable),
        ]
    );

    // Big-endian 32-bit x86 executable: every header field in file byte
    // order, so a byte-order bug in either backend shows up as a mismatch.
    let mut be = vec![0u8; 28];
    be[0..4].copy_from_slice(&0xfeed_face_u32.to_be_bytes());
    be[4..8].copy_from_slice(&7u32.to_be_bytes());
    be[12..16].copy_from_slice(&2u32.to_be_bytes());
    let path = write_fixture(dir.path(), "x86-be", &be);
    let slices = backend.slices(&ctx, &path).await.unwrap();
    assert_eq!(slices, vec![BinarySlice::new(Arch::X86, BinaryKind::Executable)]);
}
