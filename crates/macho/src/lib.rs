#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Mach-O inspection and relocation for hops
//!
//! This crate classifies thin and fat/universal Mach-O binaries, reads their
//! link metadata (dylib id and linked-library install names), and rewrites
//! install-name references in place when a keg moves to a new prefix.
//!
//! Two independent backends implement the same capability interface:
//!
//! - [`NativeBackend`] parses and edits the binary structurally in-process.
//! - [`CctoolsBackend`] shells out to `otool` and `install_name_tool`.
//!
//! During the migration between them, [`CheckedBackend`] runs every operation
//! through both and fails hard on any divergence. The backend is always an
//! explicit [`BackendStrategy`] choice made at construction, never ambient
//! state.

pub mod arch;
pub mod backend;
pub mod cctools;
pub mod checked;
pub mod native;
pub mod reader;
pub mod relocate;

pub use arch::{Arch, BinaryKind, BinarySlice, LinkMetadata};
pub use backend::{BackendStrategy, MachOBackend, OpContext};
pub use cctools::CctoolsBackend;
pub use checked::CheckedBackend;
pub use native::NativeBackend;
pub use reader::Reader;
pub use relocate::{RelocationReport, Relocator};
