//! Hand-built Mach-O fixtures for editor and verifier tests
//!
//! Little-endian 64-bit dylibs with one `__TEXT,__text` section, an
//! LC_ID_DYLIB and one LC_LOAD_DYLIB per linked library, plus a fat wrapper.
//! Offsets follow `/usr/include/mach-o/loader.h`.
#![allow(dead_code)]

use std::path::Path;

pub const MH_MAGIC_64: u32 = 0xfeed_facf;
pub const MH_DYLIB: u32 = 0x6;
pub const MH_EXECUTE: u32 = 0x2;
pub const LC_SEGMENT_64: u32 = 0x19;
pub const LC_ID_DYLIB: u32 = 0xd;
pub const LC_LOAD_DYLIB: u32 = 0xc;
pub const CPU_TYPE_X86_64: u32 = 0x0100_0007;
pub const CPU_TYPE_ARM64: u32 = 0x0100_000c;

const HEADER_SIZE: usize = 32;
const TEXT_SIZE: usize = 16;

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_name16(out: &mut Vec<u8>, name: &str) {
    let mut bytes = [0u8; 16];
    bytes[..name.len()].copy_from_slice(name.as_bytes());
    out.extend_from_slice(&bytes);
}

fn dylib_command(cmd: u32, name: &str) -> Vec<u8> {
    let cmdsize = (24 + name.len() + 1).next_multiple_of(8);
    let mut out = Vec::with_capacity(cmdsize);
    push_u32(&mut out, cmd);
    push_u32(&mut out, cmdsize as u32);
    push_u32(&mut out, 24); // dylib.name offset
    push_u32(&mut out, 2); // timestamp
    push_u32(&mut out, 0x0001_0000); // current_version
    push_u32(&mut out, 0x0001_0000); // compatibility_version
    out.extend_from_slice(name.as_bytes());
    out.resize(cmdsize, 0);
    out
}

fn text_segment_command(text_offset: u32, file_size: u64) -> Vec<u8> {
    let cmdsize = 72 + 80;
    let mut out = Vec::with_capacity(cmdsize);
    push_u32(&mut out, LC_SEGMENT_64);
    push_u32(&mut out, cmdsize as u32);
    push_name16(&mut out, "__TEXT");
    push_u64(&mut out, 0); // vmaddr
    push_u64(&mut out, 0x1000); // vmsize
    push_u64(&mut out, 0); // fileoff
    push_u64(&mut out, file_size); // filesize
    push_u32(&mut out, 7); // maxprot
    push_u32(&mut out, 5); // initprot
    push_u32(&mut out, 1); // nsects
    push_u32(&mut out, 0); // flags

    // section_64 __text
    push_name16(&mut out, "__text");
    push_name16(&mut out, "__TEXT");
    push_u64(&mut out, 0x400); // addr
    push_u64(&mut out, TEXT_SIZE as u64); // size
    push_u32(&mut out, text_offset); // offset
    push_u32(&mut out, 4); // align
    push_u32(&mut out, 0); // reloff
    push_u32(&mut out, 0); // nreloc
    push_u32(&mut out, 0x8000_0400); // flags
    push_u32(&mut out, 0); // reserved1
    push_u32(&mut out, 0); // reserved2
    push_u32(&mut out, 0); // reserved3
    out
}

/// Build a thin little-endian 64-bit Mach-O with the given identity.
///
/// `dylib_id: None` produces an executable without an LC_ID_DYLIB.
/// `headerpad` is the slack between the end of the load commands and the
/// `__text` data, the only space an install-name rewrite may grow into.
pub fn thin_binary(
    cputype: u32,
    dylib_id: Option<&str>,
    libs: &[&str],
    headerpad: usize,
) -> Vec<u8> {
    let mut commands: Vec<Vec<u8>> = Vec::new();
    if let Some(id) = dylib_id {
        commands.push(dylib_command(LC_ID_DYLIB, id));
    }
    for lib in libs {
        commands.push(dylib_command(LC_LOAD_DYLIB, lib));
    }

    let sizeofcmds: usize = (72 + 80) + commands.iter().map(Vec::len).sum::<usize>();
    let text_offset = HEADER_SIZE + sizeofcmds + headerpad;
    let file_size = text_offset + TEXT_SIZE;
    let filetype = if dylib_id.is_some() { MH_DYLIB } else { MH_EXECUTE };

    let mut out = Vec::with_capacity(file_size);
    push_u32(&mut out, MH_MAGIC_64);
    push_u32(&mut out, cputype);
    push_u32(&mut out, 0); // cpusubtype
    push_u32(&mut out, filetype);
    push_u32(&mut out, (commands.len() + 1) as u32); // ncmds
    push_u32(&mut out, sizeofcmds as u32);
    push_u32(&mut out, 0); // flags
    push_u32(&mut out, 0); // reserved

    out.extend_from_slice(&text_segment_command(text_offset as u32, file_size as u64));
    for cmd in &commands {
        out.extend_from_slice(cmd);
    }

    out.resize(text_offset, 0);
    out.resize(file_size, 0xCC);
    out
}

/// Wrap thin slices into a fat/universal binary (big-endian fat header).
pub fn fat_binary(slices: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let header_len = 8 + slices.len() * 20;
    let mut offsets = Vec::new();
    let mut pos = header_len.next_multiple_of(4096);
    for (_, s) in slices {
        offsets.push(pos);
        pos = (pos + s.len()).next_multiple_of(4096);
    }

    let mut out = vec![0u8; pos];
    out[0..4].copy_from_slice(&0xcafe_babeu32.to_be_bytes());
    out[4..8].copy_from_slice(&(slices.len() as u32).to_be_bytes());
    for (i, ((cputype, slice), offset)) in slices.iter().zip(&offsets).enumerate() {
        let record = 8 + i * 20;
        out[record..record + 4].copy_from_slice(&cputype.to_be_bytes());
        out[record + 8..record + 12].copy_from_slice(&(*offset as u32).to_be_bytes());
        out[record + 12..record + 16].copy_from_slice(&(slice.len() as u32).to_be_bytes());
        out[record + 16..record + 20].copy_from_slice(&12u32.to_be_bytes());
        out[*offset..*offset + slice.len()].copy_from_slice(slice);
    }
    out
}

/// Write fixture bytes into a temp dir and hand back the file path.
pub fn write_fixture(dir: &Path, name: &str, data: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}
