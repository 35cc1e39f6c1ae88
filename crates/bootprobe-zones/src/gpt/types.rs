//! GPT partition types and structures
//!
//! All multi-byte fields are little-endian. GUIDs are stored in the mixed
//! endian layout defined by UEFI: the first three fields little-endian, the
//! last eight bytes as-is.

use bootprobe_core::{Error, Result};
use std::fmt;
use uuid::Uuid;

/// GPT partition type GUID, in on-disk byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionTypeGuid(pub [u8; 16]);

impl PartitionTypeGuid {
    /// Unused entry
    pub const UNUSED: Self = Self([0; 16]);

    /// EFI System Partition, C12A7328-F81F-11D2-BA4B-00A0C93EC93B
    pub const EFI_SYSTEM: Self = Self([
        0x28, 0x73, 0x2a, 0xc1, 0x1f, 0xf8, 0xd2, 0x11,
        0xba, 0x4b, 0x00, 0xa0, 0xc9, 0x3e, 0xc9, 0x3b,
    ]);

    /// BIOS boot partition (GRUB core image on GPT disks)
    pub const BIOS_BOOT: Self = Self([
        0x48, 0x61, 0x68, 0x21, 0x49, 0x64, 0x6f, 0x6e,
        0x74, 0x4e, 0x65, 0x65, 0x64, 0x45, 0x46, 0x49,
    ]);

    /// Microsoft Basic Data (FAT, NTFS, exFAT)
    pub const MICROSOFT_BASIC_DATA: Self = Self([
        0xa2, 0xa0, 0xd0, 0xeb, 0xe5, 0xb9, 0x33, 0x44,
        0x87, 0xc0, 0x68, 0xb6, 0xb7, 0x26, 0x99, 0xc7,
    ]);

    /// Microsoft Reserved
    pub const MICROSOFT_RESERVED: Self = Self([
        0x16, 0xe3, 0xc9, 0xe3, 0x5c, 0x0b, 0xb8, 0x4d,
        0x81, 0x7d, 0xf9, 0x2d, 0xf0, 0x02, 0x15, 0xae,
    ]);

    /// Linux filesystem
    pub const LINUX_FILESYSTEM: Self = Self([
        0xaf, 0x3d, 0xc6, 0x0f, 0x83, 0x84, 0x72, 0x47,
        0x8e, 0x79, 0x3d, 0x69, 0xd8, 0x47, 0x7d, 0xe4,
    ]);

    /// Linux swap
    pub const LINUX_SWAP: Self = Self([
        0x6d, 0xfd, 0x57, 0x06, 0xab, 0xa4, 0xc4, 0x43,
        0x84, 0xe5, 0x09, 0x33, 0xc8, 0x4b, 0x4f, 0x4f,
    ]);

    /// Get a human-readable name for this partition type
    pub fn name(&self) -> &'static str {
        match *self {
            Self::UNUSED => "Unused",
            Self::EFI_SYSTEM => "EFI System",
            Self::BIOS_BOOT => "BIOS boot",
            Self::MICROSOFT_BASIC_DATA => "Microsoft Basic Data",
            Self::MICROSOFT_RESERVED => "Microsoft Reserved",
            Self::LINUX_FILESYSTEM => "Linux filesystem",
            Self::LINUX_SWAP => "Linux swap",
            _ => "Unknown",
        }
    }

    pub fn is_unused(&self) -> bool {
        *self == Self::UNUSED
    }

    /// Canonical GUID value
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes_le(self.0)
    }

    /// On-disk form of a canonical GUID
    pub fn from_uuid(guid: &Uuid) -> Self {
        Self(guid.to_bytes_le())
    }
}

impl fmt::Display for PartitionTypeGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub(crate) fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

pub(crate) fn le_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

fn guid_at(bytes: &[u8], at: usize) -> [u8; 16] {
    let mut raw = [0u8; 16];
    raw.copy_from_slice(&bytes[at..at + 16]);
    raw
}

/// GPT partition entry
///
/// The first 128 bytes of every entry slot share this layout; larger entry
/// sizes only append fields.
#[derive(Debug, Clone)]
pub struct GptPartitionEntry {
    pub partition_type_guid: PartitionTypeGuid,
    pub unique_partition_guid: Uuid,
    /// First LBA (inclusive)
    pub first_lba: u64,
    /// Last LBA (inclusive)
    pub last_lba: u64,
    pub attributes: u64,
    /// Partition name (UTF-16LE, 72 bytes = 36 characters)
    pub name: String,
}

impl GptPartitionEntry {
    /// Minimum size of a partition entry in bytes
    pub const ENTRY_SIZE: usize = 128;

    /// Parse a partition entry from bytes
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::ENTRY_SIZE {
            return Err(Error::invalid_zone_table(format!(
                "GPT partition entry of {} bytes is shorter than {}",
                bytes.len(),
                Self::ENTRY_SIZE
            )));
        }

        Ok(Self {
            partition_type_guid: PartitionTypeGuid(guid_at(bytes, 0)),
            unique_partition_guid: Uuid::from_bytes_le(guid_at(bytes, 16)),
            first_lba: le_u64(bytes, 32),
            last_lba: le_u64(bytes, 40),
            attributes: le_u64(bytes, 48),
            name: Self::parse_name(&bytes[56..128]),
        })
    }

    pub fn is_unused(&self) -> bool {
        self.partition_type_guid.is_unused()
    }

    /// Get the size of this partition in LBA sectors
    pub fn size_lba(&self) -> u64 {
        if self.last_lba >= self.first_lba {
            self.last_lba - self.first_lba + 1
        } else {
            0
        }
    }

    /// Parse UTF-16LE partition name, stopping at the first NUL
    fn parse_name(bytes: &[u8]) -> String {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|&unit| unit != 0)
            .collect();
        String::from_utf16_lossy(&units)
    }
}

/// GPT header
#[derive(Debug, Clone)]
pub struct GptHeader {
    /// GPT revision (usually 0x00010000)
    pub revision: u32,
    pub header_size: u32,
    pub header_crc32: u32,
    /// LBA of this header
    pub my_lba: u64,
    /// LBA of the backup header
    pub alternate_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub disk_guid: Uuid,
    pub partition_entries_lba: u64,
    pub num_partition_entries: u32,
    pub partition_entry_size: u32,
    pub partition_entries_crc32: u32,
}

impl GptHeader {
    /// GPT header signature
    pub const SIGNATURE: &'static [u8; 8] = b"EFI PART";

    /// Size of the defined header fields
    pub const HEADER_SIZE: usize = 92;

    const CRC_OFFSET: usize = 16;

    pub fn has_signature(bytes: &[u8]) -> bool {
        bytes.starts_with(Self::SIGNATURE)
    }

    /// Parse a GPT header from the sector holding it
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::HEADER_SIZE {
            return Err(Error::invalid_zone_table("GPT header sector too small"));
        }
        if !Self::has_signature(bytes) {
            return Err(Error::invalid_zone_table("Invalid GPT header signature"));
        }

        Ok(Self {
            revision: le_u32(bytes, 8),
            header_size: le_u32(bytes, 12),
            header_crc32: le_u32(bytes, Self::CRC_OFFSET),
            my_lba: le_u64(bytes, 24),
            alternate_lba: le_u64(bytes, 32),
            first_usable_lba: le_u64(bytes, 40),
            last_usable_lba: le_u64(bytes, 48),
            disk_guid: Uuid::from_bytes_le(guid_at(bytes, 56)),
            partition_entries_lba: le_u64(bytes, 72),
            num_partition_entries: le_u32(bytes, 80),
            partition_entry_size: le_u32(bytes, 84),
            partition_entries_crc32: le_u32(bytes, 88),
        })
    }

    /// CRC32 of the first `header_size` bytes with the CRC field zeroed
    ///
    /// Returns `None` when `header_size` does not fit in `header_bytes`.
    pub fn compute_header_crc32(&self, header_bytes: &[u8]) -> Option<u32> {
        let size = self.header_size as usize;
        if size < Self::HEADER_SIZE || header_bytes.len() < size {
            return None;
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header_bytes[..Self::CRC_OFFSET]);
        hasher.update(&[0u8; 4]);
        hasher.update(&header_bytes[Self::CRC_OFFSET + 4..size]);
        Some(hasher.finalize())
    }

    pub fn verify_header_crc32(&self, header_bytes: &[u8]) -> bool {
        self.compute_header_crc32(header_bytes) == Some(self.header_crc32)
    }

    pub fn verify_partition_entries_crc32(&self, entries: &[u8]) -> bool {
        crc32fast::hash(entries) == self.partition_entries_crc32
    }
}
