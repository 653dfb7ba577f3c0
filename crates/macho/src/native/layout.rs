//! Load-command layout parsing for the in-process backend

use std::path::Path;

use hops_errors::MachOError;

use crate::arch::LinkMetadata;
use crate::reader::{read_u32, read_u32_be, ThinFormat, FAT_MAGIC};

pub const LC_SEGMENT: u32 = 0x1;
pub const LC_SEGMENT_64: u32 = 0x19;
pub const LC_ID_DYLIB: u32 = 0xd;
pub const LC_LOAD_DYLIB: u32 = 0xc;
pub const LC_LAZY_LOAD_DYLIB: u32 = 0x20;
pub const LC_LOAD_WEAK_DYLIB: u32 = 0x8000_0018;
pub const LC_REEXPORT_DYLIB: u32 = 0x8000_001f;
pub const LC_LOAD_UPWARD_DYLIB: u32 = 0x8000_0023;

/// dylib_command fixed part: cmd, cmdsize, then the dylib struct
/// (name offset, timestamp, current_version, compatibility_version).
pub const DYLIB_COMMAND_SIZE: usize = 24;

/// `true` for every load command that records a linked library.
#[must_use]
pub fn is_load_dylib(cmd: u32) -> bool {
    matches!(
        cmd,
        LC_LOAD_DYLIB
            | LC_LOAD_WEAK_DYLIB
            | LC_REEXPORT_DYLIB
            | LC_LAZY_LOAD_DYLIB
            | LC_LOAD_UPWARD_DYLIB
    )
}

/// One load command, offsets relative to the slice start.
#[derive(Debug, Clone)]
pub struct CommandRef {
    pub cmd: u32,
    pub offset: usize,
    pub cmdsize: u32,
}

/// Parsed framing of one slice: enough to read metadata and to rewrite
/// dylib strings without disturbing anything else.
#[derive(Debug, Clone)]
pub struct SliceLayout {
    /// Slice start within the file
    pub base: usize,
    /// Slice length in bytes
    pub size: usize,
    pub format: ThinFormat,
    pub filetype: u32,
    pub sizeofcmds: u32,
    pub commands: Vec<CommandRef>,
    /// Lowest non-zero section file offset (slice-relative). Bounds how far
    /// the load-command region may grow.
    pub min_section_offset: Option<u32>,
}

impl SliceLayout {
    pub fn header_size(&self) -> usize {
        self.format.header_size()
    }

    /// Slice-relative end of the load-command region.
    pub fn load_end(&self) -> usize {
        self.header_size() + self.sizeofcmds as usize
    }
}

/// (offset, size) regions of every slice: one region for thin files, one per
/// fat record otherwise. Fat framing errors are `Malformed`; the caller has
/// already classified the file so an unknown magic here cannot happen.
pub fn slice_regions(path: &Path, data: &[u8]) -> Result<Vec<(usize, usize)>, MachOError> {
    let magic = read_u32_be(data, 0).ok_or_else(|| not_macho(path))?;
    if magic != FAT_MAGIC {
        return Ok(vec![(0, data.len())]);
    }

    let nfat = read_u32_be(data, 4)
        .ok_or_else(|| MachOError::malformed(display(path), "truncated fat header"))?;
    // Bound the untrusted count before allocating anything for it.
    let nfat = nfat as usize;
    if nfat
        .checked_mul(20)
        .and_then(|len| len.checked_add(8))
        .is_none_or(|end| end > data.len())
    {
        return Err(MachOError::malformed(
            display(path),
            "fat header count exceeds file size",
        ));
    }
    let mut regions = Vec::with_capacity(nfat);
    for i in 0..nfat {
        let record = 8 + i * 20;
        let offset = read_u32_be(data, record + 8);
        let size = read_u32_be(data, record + 12);
        let (Some(offset), Some(size)) = (offset, size) else {
            return Err(MachOError::malformed(
                display(path),
                "truncated fat arch record",
            ));
        };
        let (offset, size) = (offset as usize, size as usize);
        if offset + size > data.len() {
            return Err(MachOError::malformed(
                display(path),
                "fat slice extends past end of file",
            ));
        }
        regions.push((offset, size));
    }
    Ok(regions)
}

/// Parse the load-command framing of the slice at `base`.
pub fn parse_slice(
    path: &Path,
    data: &[u8],
    base: usize,
    size: usize,
) -> Result<SliceLayout, MachOError> {
    let magic = read_u32_be(data, base).ok_or_else(|| not_macho(path))?;
    let format = ThinFormat::from_magic(magic).ok_or_else(|| not_macho(path))?;
    let le = format.little_endian;

    let ncmds = read_u32(data, base + 16, le);
    let sizeofcmds = read_u32(data, base + 20, le);
    let filetype = read_u32(data, base + 12, le);
    let (Some(ncmds), Some(sizeofcmds), Some(filetype)) = (ncmds, sizeofcmds, filetype) else {
        return Err(MachOError::malformed(display(path), "truncated Mach-O header"));
    };

    let header_size = format.header_size();
    let load_end = header_size + sizeofcmds as usize;
    if load_end > size || base + load_end > data.len() {
        return Err(MachOError::malformed(
            display(path),
            "load commands extend past end of slice",
        ));
    }

    // Every load command is at least 8 bytes, so the region size caps how
    // many an honest ncmds can describe.
    let mut commands = Vec::with_capacity((ncmds as usize).min(sizeofcmds as usize / 8));
    let mut min_section_offset: Option<u32> = None;
    let mut cursor = header_size;

    for _ in 0..ncmds {
        if cursor + 8 > load_end {
            return Err(MachOError::malformed(
                display(path),
                "load command overruns command region",
            ));
        }
        let cmd = read_u32(data, base + cursor, le).unwrap_or(0);
        let cmdsize = read_u32(data, base + cursor + 4, le).unwrap_or(0);
        if cmdsize < 8 || cursor + cmdsize as usize > load_end {
            return Err(MachOError::malformed(
                display(path),
                "load command has invalid cmdsize",
            ));
        }

        if cmd == LC_SEGMENT || cmd == LC_SEGMENT_64 {
            let sect_min = segment_min_section_offset(data, base + cursor, cmdsize, cmd, le);
            min_section_offset = match (min_section_offset, sect_min) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }

        commands.push(CommandRef {
            cmd,
            offset: cursor,
            cmdsize,
        });
        cursor += cmdsize as usize;
    }

    Ok(SliceLayout {
        base,
        size,
        format,
        filetype,
        sizeofcmds,
        commands,
        min_section_offset,
    })
}

/// Lowest non-zero section data offset recorded by one segment command.
/// Zerofill sections carry offset 0 and are skipped.
fn segment_min_section_offset(
    data: &[u8],
    cmd_start: usize,
    cmdsize: u32,
    cmd: u32,
    le: bool,
) -> Option<u32> {
    let (nsects_at, sections_at, section_size, offset_at) = if cmd == LC_SEGMENT_64 {
        (64, 72, 80, 48)
    } else {
        (48, 56, 68, 40)
    };

    let nsects = read_u32(data, cmd_start + nsects_at, le)?;
    let mut min: Option<u32> = None;
    for i in 0..nsects as usize {
        let sect = cmd_start + sections_at + i * section_size;
        if sect + section_size > cmd_start + cmdsize as usize {
            break;
        }
        let offset = read_u32(data, sect + offset_at, le)?;
        if offset > 0 {
            min = Some(min.map_or(offset, |m| m.min(offset)));
        }
    }
    min
}

/// Read the install-name string embedded in a dylib load command.
pub fn dylib_name(
    path: &Path,
    data: &[u8],
    layout: &SliceLayout,
    cref: &CommandRef,
) -> Result<String, MachOError> {
    let le = layout.format.little_endian;
    let cmd_start = layout.base + cref.offset;
    let name_offset = read_u32(data, cmd_start + 8, le)
        .ok_or_else(|| MachOError::malformed(display(path), "truncated dylib command"))?;

    let start = cmd_start + name_offset as usize;
    let end = cmd_start + cref.cmdsize as usize;
    if name_offset as usize >= cref.cmdsize as usize || end > data.len() {
        return Err(MachOError::malformed(
            display(path),
            "dylib name offset outside its command",
        ));
    }

    let bytes = &data[start..end];
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    Ok(String::from_utf8_lossy(&bytes[..len]).into_owned())
}

/// Link metadata of one slice, load-command order preserved.
pub fn slice_metadata(
    path: &Path,
    data: &[u8],
    layout: &SliceLayout,
) -> Result<LinkMetadata, MachOError> {
    let mut metadata = LinkMetadata::default();
    for cref in &layout.commands {
        if cref.cmd == LC_ID_DYLIB {
            // The id counts only when the file is itself a dylib.
            if layout.filetype == crate::reader::MH_DYLIB {
                metadata.dylib_id = Some(dylib_name(path, data, layout, cref)?);
            }
        } else if is_load_dylib(cref.cmd) {
            metadata
                .linked_libraries
                .push(dylib_name(path, data, layout, cref)?);
        }
    }
    Ok(metadata)
}

pub(crate) fn display(path: &Path) -> String {
    path.display().to_string()
}

fn not_macho(path: &Path) -> MachOError {
    MachOError::NotMachO {
        path: display(path),
    }
}
