//! Mach-O slice classification types and link metadata

use serde::{Deserialize, Serialize};
use std::fmt;

/// CPU architecture of one Mach-O slice.
///
/// Valid-but-unrecognized cputype tags classify as `Unknown`; that is never
/// an error, so future architectures pass through cleanup sweeps untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    X86,
    X86_64,
    Ppc7400,
    Ppc64,
    Arm,
    Arm64,
    Unknown,
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::X86 => "i386",
            Self::X86_64 => "x86_64",
            Self::Ppc7400 => "ppc7400",
            Self::Ppc64 => "ppc64",
            Self::Arm => "arm",
            Self::Arm64 => "arm64",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Binary type of one Mach-O slice, from the header's filetype field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryKind {
    Executable,
    Dylib,
    Bundle,
    Unknown,
}

impl fmt::Display for BinaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Executable => "executable",
            Self::Dylib => "dylib",
            Self::Bundle => "bundle",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One classified slice of a binary. A thin file yields exactly one; a fat
/// file yields one per architecture record, in record order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinarySlice {
    pub arch: Arch,
    pub kind: BinaryKind,
}

impl BinarySlice {
    #[must_use]
    pub fn new(arch: Arch, kind: BinaryKind) -> Self {
        Self { arch, kind }
    }
}

/// Link metadata read from a binary's load commands.
///
/// `dylib_id` is present only when the file is itself a dynamic library.
/// `linked_libraries` preserves load-command order. For fat binaries both
/// fields come from the first slice.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkMetadata {
    pub dylib_id: Option<String>,
    pub linked_libraries: Vec<String>,
}
