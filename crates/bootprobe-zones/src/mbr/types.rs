//! MBR partition types and records

use std::fmt;

/// MBR partition type code (system indicator byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbrPartitionType(pub u8);

impl MbrPartitionType {
    /// Empty/unused partition entry
    pub const EMPTY: Self = Self(0x00);
    pub const FAT12: Self = Self(0x01);
    pub const FAT16_SMALL: Self = Self(0x04);
    pub const EXTENDED: Self = Self(0x05);
    pub const FAT16: Self = Self(0x06);
    /// NTFS/exFAT/HPFS
    pub const NTFS: Self = Self(0x07);
    pub const FAT32_CHS: Self = Self(0x0B);
    pub const FAT32_LBA: Self = Self(0x0C);
    pub const FAT16_LBA: Self = Self(0x0E);
    pub const EXTENDED_LBA: Self = Self(0x0F);
    pub const LINUX_SWAP: Self = Self(0x82);
    /// Linux native (ext2/ext3/ext4)
    pub const LINUX_NATIVE: Self = Self(0x83);
    pub const LINUX_LVM: Self = Self(0x8E);
    /// GPT protective MBR
    pub const GPT_PROTECTIVE: Self = Self(0xEE);
    /// EFI system partition on an MBR disk
    pub const EFI_SYSTEM: Self = Self(0xEF);

    /// Get a human-readable name for this partition type
    pub fn name(&self) -> &'static str {
        match *self {
            Self::EMPTY => "Empty",
            Self::FAT12 => "FAT12",
            Self::FAT16_SMALL => "FAT16 (<32MB)",
            Self::EXTENDED => "Extended",
            Self::FAT16 => "FAT16",
            Self::NTFS => "NTFS/exFAT",
            Self::FAT32_CHS => "FAT32 (CHS)",
            Self::FAT32_LBA => "FAT32 (LBA)",
            Self::FAT16_LBA => "FAT16 (LBA)",
            Self::EXTENDED_LBA => "Extended (LBA)",
            Self::LINUX_SWAP => "Linux swap",
            Self::LINUX_NATIVE => "Linux",
            Self::LINUX_LVM => "Linux LVM",
            Self::GPT_PROTECTIVE => "GPT Protective",
            Self::EFI_SYSTEM => "EFI System",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for MbrPartitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.0)
    }
}

/// One of the four primary partition records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbrPartitionRecord {
    /// 1-based slot number
    pub slot: u32,
    pub partition_type: MbrPartitionType,
    pub lba_start: u32,
    pub lba_length: u32,
}

impl MbrPartitionRecord {
    /// Size of a partition record in bytes
    pub const SIZE: usize = 16;

    /// Parse a 16-byte partition record
    ///
    /// The boot indicator and CHS fields (bytes 0-3 and 5-7) are ignored; LBA
    /// fields are authoritative.
    pub fn parse(slot: u32, bytes: &[u8; 16]) -> Self {
        Self {
            slot,
            partition_type: MbrPartitionType(bytes[4]),
            lba_start: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            lba_length: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        }
    }

    /// Empty records carry type 0 or a zero length
    pub fn is_used(&self) -> bool {
        self.partition_type != MbrPartitionType::EMPTY && self.lba_length != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_type_name() {
        assert_eq!(MbrPartitionType::FAT32_LBA.name(), "FAT32 (LBA)");
        assert_eq!(MbrPartitionType::LINUX_NATIVE.name(), "Linux");
        assert_eq!(MbrPartitionType(0x42).name(), "Unknown");
        assert_eq!(MbrPartitionType::GPT_PROTECTIVE.to_string(), "GPT Protective (0xEE)");
    }

    #[test]
    fn test_record_parse() {
        let mut bytes = [0u8; 16];
        bytes[0] = 0x80;
        bytes[4] = 0x83;
        bytes[8..12].copy_from_slice(&2048u32.to_le_bytes());
        bytes[12..16].copy_from_slice(&4096u32.to_le_bytes());

        let record = MbrPartitionRecord::parse(1, &bytes);
        assert!(record.is_used());
        assert_eq!(record.partition_type, MbrPartitionType::LINUX_NATIVE);
        assert_eq!(record.lba_start, 2048);
        assert_eq!(record.lba_length, 4096);
    }

    #[test]
    fn test_record_unused() {
        let mut bytes = [0u8; 16];
        bytes[4] = 0x83;
        assert!(!MbrPartitionRecord::parse(1, &bytes).is_used());

        bytes[4] = 0;
        bytes[12] = 1;
        assert!(!MbrPartitionRecord::parse(1, &bytes).is_used());
    }
}
