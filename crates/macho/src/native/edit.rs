//! In-place rewriting of dylib load-command strings
//!
//! Rewrites stay inside the slice's existing bytes: growing a command only
//! consumes headerpad (the zero region between the end of the load commands
//! and the first section's data), so slice count, order and file size never
//! change.

use std::path::Path;

use hops_errors::MachOError;

use super::layout::{display, CommandRef, SliceLayout, DYLIB_COMMAND_SIZE};
use crate::reader::read_u32;

fn write_u32(data: &mut [u8], offset: usize, value: u32, little_endian: bool) {
    let bytes = if little_endian {
        value.to_le_bytes()
    } else {
        value.to_be_bytes()
    };
    data[offset..offset + 4].copy_from_slice(&bytes);
}

/// Replace the string of one dylib command with `new_name`, re-aligning the
/// command size and shifting every later command, then fixing `sizeofcmds`.
pub fn rewrite_dylib_string(
    path: &Path,
    data: &mut [u8],
    layout: &SliceLayout,
    cref: &CommandRef,
    new_name: &str,
) -> Result<(), MachOError> {
    let le = layout.format.little_endian;
    let align = if layout.format.is_64 { 8 } else { 4 };
    let cmd_start = layout.base + cref.offset;

    let name_offset = read_u32(data, cmd_start + 8, le)
        .ok_or_else(|| MachOError::malformed(display(path), "truncated dylib command"))?
        as usize;
    if name_offset < DYLIB_COMMAND_SIZE {
        return Err(MachOError::malformed(
            display(path),
            "dylib name offset inside fixed command header",
        ));
    }

    let old_cmdsize = cref.cmdsize as usize;
    let new_cmdsize = (name_offset + new_name.len() + 1).next_multiple_of(align);

    let load_end = layout.base + layout.load_end();
    let new_load_end = load_end + new_cmdsize - old_cmdsize;

    // The load-command region may only grow into the headerpad below the
    // first section's data.
    let limit = layout
        .min_section_offset
        .map_or(layout.size, |o| (o as usize).min(layout.size));
    if new_cmdsize > old_cmdsize {
        let grow = new_cmdsize - old_cmdsize;
        let available = (layout.base + limit).saturating_sub(load_end);
        if grow > available || new_load_end > data.len() {
            return Err(MachOError::LoadCommandSpace {
                path: display(path),
                message: format!("need {grow} more bytes, {available} available"),
            });
        }
    }

    // Shift the commands that follow, then lay down the resized command.
    let old_cmd_end = cmd_start + old_cmdsize;
    let new_cmd_end = cmd_start + new_cmdsize;
    let tail = data[old_cmd_end..load_end].to_vec();

    write_u32(data, cmd_start + 4, new_cmdsize as u32, le);
    let name_start = cmd_start + name_offset;
    data[name_start..new_cmd_end].fill(0);
    data[name_start..name_start + new_name.len()].copy_from_slice(new_name.as_bytes());

    data[new_cmd_end..new_cmd_end + tail.len()].copy_from_slice(&tail);
    if new_load_end < load_end {
        // Shrank: the vacated span returns to headerpad zeros.
        data[new_load_end..load_end].fill(0);
    }

    let new_sizeofcmds =
        layout.sizeofcmds + new_cmdsize as u32 - old_cmdsize as u32;
    write_u32(data, layout.base + 20, new_sizeofcmds, le);
    Ok(())
}
