//! Thin/fat Mach-O header classification
//!
//! Byte layout reference: `/usr/include/mach-o/loader.h` and
//! `/usr/include/mach-o/fat.h`. The fat header is two big-endian 32-bit
//! words (magic, nfat_arch) followed by `nfat_arch` 20-byte `fat_arch`
//! records; the slice offset sits 8 bytes into each record.

use std::path::Path;

use hops_errors::MachOError;

use crate::arch::{Arch, BinaryKind, BinarySlice};

/// Universal binary magic, always big-endian on disk.
pub const FAT_MAGIC: u32 = 0xcafe_babe;
/// 32-bit Mach-O, big-endian file.
pub const MH_MAGIC: u32 = 0xfeed_face;
/// 64-bit Mach-O, big-endian file.
pub const MH_MAGIC_64: u32 = 0xfeed_facf;
/// 32-bit Mach-O, little-endian file (magic as read big-endian).
pub const MH_CIGAM: u32 = 0xcefa_edfe;
/// 64-bit Mach-O, little-endian file (magic as read big-endian).
pub const MH_CIGAM_64: u32 = 0xcffa_edfe;

pub const CPU_TYPE_X86: u32 = 7;
pub const CPU_TYPE_X86_64: u32 = 0x0100_0007;
pub const CPU_TYPE_ARM: u32 = 12;
pub const CPU_TYPE_ARM64: u32 = 0x0100_000c;
pub const CPU_TYPE_POWERPC: u32 = 18;
pub const CPU_TYPE_POWERPC64: u32 = 0x0100_0012;

pub const MH_EXECUTE: u32 = 0x2;
pub const MH_DYLIB: u32 = 0x6;
pub const MH_BUNDLE: u32 = 0x8;

const FAT_HEADER_SIZE: usize = 8;
const FAT_ARCH_SIZE: usize = 20;

/// Read a u32 at `offset`, big-endian.
pub(crate) fn read_u32_be(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Read a u32 at `offset` in the file's native byte order.
pub(crate) fn read_u32(data: &[u8], offset: usize, little_endian: bool) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    let arr = [bytes[0], bytes[1], bytes[2], bytes[3]];
    Some(if little_endian {
        u32::from_le_bytes(arr)
    } else {
        u32::from_be_bytes(arr)
    })
}

/// Shared (magic, cputype) classification table.
///
/// Both backends classify through this table so checked mode can never
/// diverge on architecture naming. Anything validly Mach-O-tagged but not
/// listed here is `Unknown`, never an error.
#[must_use]
pub fn classify_arch(cputype: u32) -> Arch {
    match cputype {
        CPU_TYPE_X86 => Arch::X86,
        CPU_TYPE_X86_64 => Arch::X86_64,
        CPU_TYPE_POWERPC => Arch::Ppc7400,
        CPU_TYPE_POWERPC64 => Arch::Ppc64,
        CPU_TYPE_ARM => Arch::Arm,
        CPU_TYPE_ARM64 => Arch::Arm64,
        _ => Arch::Unknown,
    }
}

/// Filetype classification, same table for both backends.
#[must_use]
pub fn classify_kind(filetype: u32) -> BinaryKind {
    match filetype {
        MH_EXECUTE => BinaryKind::Executable,
        MH_DYLIB => BinaryKind::Dylib,
        MH_BUNDLE => BinaryKind::Bundle,
        _ => BinaryKind::Unknown,
    }
}

/// Width and byte order selected by a thin magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ThinFormat {
    pub is_64: bool,
    pub little_endian: bool,
}

impl ThinFormat {
    pub(crate) fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            MH_MAGIC => Some(Self {
                is_64: false,
                little_endian: false,
            }),
            MH_MAGIC_64 => Some(Self {
                is_64: true,
                little_endian: false,
            }),
            MH_CIGAM => Some(Self {
                is_64: false,
                little_endian: true,
            }),
            MH_CIGAM_64 => Some(Self {
                is_64: true,
                little_endian: true,
            }),
            _ => None,
        }
    }

    pub(crate) fn header_size(self) -> usize {
        if self.is_64 {
            32
        } else {
            28
        }
    }
}

/// Structural header reader shared by the native backend.
///
/// Lenient by default: Mach-O-tagged input that fails deep parsing yields an
/// empty slice list so sweeps stay resilient to unusual files. `strict`
/// surfaces those as `Malformed` instead (developer mode). A missing magic is
/// always `NotMachO`, and so is a fat record whose bytes carry no Mach-O
/// magic (multi-architecture static archives).
#[derive(Debug, Clone, Copy, Default)]
pub struct Reader {
    strict: bool,
}

impl Reader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn strict(strict: bool) -> Self {
        Self { strict }
    }

    /// Classify every slice of `data`, in on-disk order.
    ///
    /// # Errors
    /// `NotMachO` when no known magic leads the file (or a fat record);
    /// `Malformed` only in strict mode.
    pub fn parse(&self, path: &Path, data: &[u8]) -> Result<Vec<BinarySlice>, MachOError> {
        let Some(magic) = read_u32_be(data, 0) else {
            return Err(MachOError::NotMachO {
                path: path.display().to_string(),
            });
        };

        if magic == FAT_MAGIC {
            return self.parse_fat(path, data);
        }

        if ThinFormat::from_magic(magic).is_none() {
            return Err(MachOError::NotMachO {
                path: path.display().to_string(),
            });
        }

        match Self::classify_thin(data, 0) {
            Some(slice) => Ok(vec![slice]),
            None => self.malformed(path, "truncated Mach-O header"),
        }
    }

    fn parse_fat(&self, path: &Path, data: &[u8]) -> Result<Vec<BinarySlice>, MachOError> {
        let Some(nfat) = read_u32_be(data, 4) else {
            return self.malformed(path, "truncated fat header");
        };

        // Bound the untrusted count before allocating anything for it.
        let nfat = nfat as usize;
        if nfat
            .checked_mul(FAT_ARCH_SIZE)
            .and_then(|len| len.checked_add(FAT_HEADER_SIZE))
            .is_none_or(|end| end > data.len())
        {
            return self.malformed(path, "fat header count exceeds file size");
        }

        let mut slices = Vec::with_capacity(nfat);
        for i in 0..nfat {
            let record = FAT_HEADER_SIZE + i * FAT_ARCH_SIZE;
            let Some(offset) = read_u32_be(data, record + 8) else {
                return self.malformed(path, "truncated fat arch record");
            };
            let offset = offset as usize;

            let Some(slice_magic) = read_u32_be(data, offset) else {
                return self.malformed(path, "fat arch offset past end of file");
            };
            if ThinFormat::from_magic(slice_magic).is_none() {
                // Fat header over non-Mach-O members: a static archive.
                return Err(MachOError::NotMachO {
                    path: path.display().to_string(),
                });
            }

            match Self::classify_thin(data, offset) {
                Some(slice) => slices.push(slice),
                None => return self.malformed(path, "truncated fat slice header"),
            }
        }
        Ok(slices)
    }

    fn classify_thin(data: &[u8], offset: usize) -> Option<BinarySlice> {
        let magic = read_u32_be(data, offset)?;
        let format = ThinFormat::from_magic(magic)?;
        let cputype = read_u32(data, offset + 4, format.little_endian)?;
        let filetype = read_u32(data, offset + 12, format.little_endian)?;
        Some(BinarySlice::new(
            classify_arch(cputype),
            classify_kind(filetype),
        ))
    }

    fn malformed(
        &self,
        path: &Path,
        message: &str,
    ) -> Result<Vec<BinarySlice>, MachOError> {
        if self.strict {
            Err(MachOError::malformed(path.display().to_string(), message))
        } else {
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn thin_header(magic: u32, cputype: u32, filetype: u32) -> Vec<u8> {
        let format = ThinFormat::from_magic(magic).unwrap();
        let mut data = vec![0u8; format.header_size()];
        data[0..4].copy_from_slice(&magic.to_be_bytes());
        let (cpu, ft) = if format.little_endian {
            (cputype.to_le_bytes(), filetype.to_le_bytes())
        } else {
            (cputype.to_be_bytes(), filetype.to_be_bytes())
        };
        data[4..8].copy_from_slice(&cpu);
        data[12..16].copy_from_slice(&ft);
        data
    }

    fn fat_of(slices: &[Vec<u8>]) -> Vec<u8> {
        let header_len = FAT_HEADER_SIZE + slices.len() * FAT_ARCH_SIZE;
        let mut offsets = Vec::new();
        let mut pos = header_len.next_multiple_of(64);
        for s in slices {
            offsets.push(pos);
            pos = (pos + s.len()).next_multiple_of(64);
        }

        let mut data = vec![0u8; pos];
        data[0..4].copy_from_slice(&FAT_MAGIC.to_be_bytes());
        data[4..8].copy_from_slice(&(slices.len() as u32).to_be_bytes());
        for (i, (s, off)) in slices.iter().zip(&offsets).enumerate() {
            let record = FAT_HEADER_SIZE + i * FAT_ARCH_SIZE;
            data[record + 8..record + 12].copy_from_slice(&(*off as u32).to_be_bytes());
            data[record + 12..record + 16].copy_from_slice(&(s.len() as u32).to_be_bytes());
            data[*off..*off + s.len()].copy_from_slice(s);
        }
        data
    }

    fn path() -> PathBuf {
        PathBuf::from("fixture.bin")
    }

    #[test]
    fn classifies_thin_fixtures() {
        let table = [
            (MH_CIGAM_64, CPU_TYPE_X86_64, MH_DYLIB, Arch::X86_64, BinaryKind::Dylib),
            (MH_CIGAM_64, CPU_TYPE_ARM64, MH_EXECUTE, Arch::Arm64, BinaryKind::Executable),
            (MH_CIGAM, CPU_TYPE_X86, MH_BUNDLE, Arch::X86, BinaryKind::Bundle),
            (MH_CIGAM, CPU_TYPE_ARM, MH_EXECUTE, Arch::Arm, BinaryKind::Executable),
            (MH_MAGIC, CPU_TYPE_POWERPC, MH_EXECUTE, Arch::Ppc7400, BinaryKind::Executable),
            (MH_MAGIC_64, CPU_TYPE_POWERPC64, MH_DYLIB, Arch::Ppc64, BinaryKind::Dylib),
        ];

        let reader = Reader::new();
        for (magic, cpu, ft, arch, kind) in table {
            let slices = reader
                .parse(&path(), &thin_header(magic, cpu, ft))
                .unwrap();
            assert_eq!(slices, vec![BinarySlice::new(arch, kind)]);
        }
    }

    #[test]
    fn unrecognized_cputype_is_unknown_not_error() {
        let reader = Reader::new();
        let slices = reader
            .parse(&path(), &thin_header(MH_CIGAM_64, 0x0100_00ff, MH_EXECUTE))
            .unwrap();
        assert_eq!(slices[0].arch, Arch::Unknown);
        assert_eq!(slices[0].kind, BinaryKind::Executable);

        let slices = reader
            .parse(&path(), &thin_header(MH_CIGAM_64, CPU_TYPE_ARM64, 0xbeef))
            .unwrap();
        assert_eq!(slices[0].kind, BinaryKind::Unknown);
    }

    #[test]
    fn fat_preserves_record_order() {
        let fat = fat_of(&[
            thin_header(MH_CIGAM_64, CPU_TYPE_X86_64, MH_DYLIB),
            thin_header(MH_CIGAM_64, CPU_TYPE_ARM64, MH_DYLIB),
            thin_header(MH_CIGAM, CPU_TYPE_ARM, MH_EXECUTE),
        ]);

        let slices = Reader::new().parse(&path(), &fat).unwrap();
        assert_eq!(
            slices.iter().map(|s| s.arch).collect::<Vec<_>>(),
            vec![Arch::X86_64, Arch::Arm64, Arch::Arm]
        );
    }

    #[test]
    fn unknown_magic_is_not_macho() {
        let cases: [&[u8]; 3] = [b"\x7fELF....", b"MZ......", b""];
        for data in cases {
            let err = Reader::new().parse(&path(), data).unwrap_err();
            assert!(matches!(err, MachOError::NotMachO { .. }), "{data:?}");
        }
    }

    #[test]
    fn fat_over_non_macho_members_is_not_macho() {
        // An ar(1) archive of objects for several architectures carries a fat
        // header but its members are not Mach-O.
        let mut member = b"!<arch>\nsome archive bytes padding padding".to_vec();
        member.resize(64, 0);
        let fat = fat_of(&[member]);
        let err = Reader::new().parse(&path(), &fat).unwrap_err();
        assert!(matches!(err, MachOError::NotMachO { .. }));
    }

    #[test]
    fn fat_count_larger_than_the_file_is_rejected_before_allocation() {
        let mut fat = vec![0u8; FAT_HEADER_SIZE];
        fat[0..4].copy_from_slice(&FAT_MAGIC.to_be_bytes());
        fat[4..8].copy_from_slice(&u32::MAX.to_be_bytes());

        assert!(Reader::new().parse(&path(), &fat).unwrap().is_empty());
        assert!(matches!(
            Reader::strict(true).parse(&path(), &fat).unwrap_err(),
            MachOError::Malformed { .. }
        ));
    }

    #[test]
    fn truncated_fat_is_empty_unless_strict() {
        let mut fat = fat_of(&[thin_header(MH_CIGAM_64, CPU_TYPE_ARM64, MH_DYLIB)]);
        fat.truncate(16);

        assert!(Reader::new().parse(&path(), &fat).unwrap().is_empty());
        assert!(matches!(
            Reader::strict(true).parse(&path(), &fat).unwrap_err(),
            MachOError::Malformed { .. }
        ));
    }
}
