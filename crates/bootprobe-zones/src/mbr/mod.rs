//! MBR (Master Boot Record) partition table implementation

pub mod types;

use bootprobe_core::{Error, PartitionEntry, PartitionTypeId, ReadSeek, Result};
use std::io::SeekFrom;
use types::{MbrPartitionRecord, MbrPartitionType};

/// MBR partition table
///
/// The Master Boot Record is the traditional partitioning scheme used by BIOS-based systems.
/// Only the four primary records are read; extended partition chains are not followed.
///
/// # Structure
///
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0x000   446   Bootstrap code
/// 0x1BE   16    Partition entry 1
/// 0x1CE   16    Partition entry 2
/// 0x1DE   16    Partition entry 3
/// 0x1EE   16    Partition entry 4
/// 0x1FE   2     Boot signature (0xAA55)
/// ```
#[derive(Debug, Clone)]
pub struct MbrTable {
    records: [MbrPartitionRecord; 4],
    disk_signature: u32,
}

impl MbrTable {
    /// The boot signature that must be present at offset 0x1FE
    pub const BOOT_SIGNATURE: u16 = 0xAA55;

    /// Size of the MBR in bytes (always 512)
    pub const MBR_SIZE: usize = 512;

    /// Offset of the first partition entry
    pub const PARTITION_TABLE_OFFSET: usize = 0x1BE;

    /// Offset of the disk signature
    pub const DISK_SIGNATURE_OFFSET: usize = 0x1B8;

    /// Offset of the boot signature
    pub const BOOT_SIGNATURE_OFFSET: usize = 0x1FE;

    /// Number of partition entries in MBR
    pub const NUM_PARTITIONS: usize = 4;

    /// Read LBA 0 from a stream
    pub fn read_sector(stream: &mut dyn ReadSeek) -> Result<[u8; 512]> {
        stream.seek(SeekFrom::Start(0))?;
        let mut sector = [0u8; Self::MBR_SIZE];
        stream.read_exact(&mut sector)?;
        Ok(sector)
    }

    /// Parse an MBR from the contents of LBA 0
    ///
    /// # Errors
    ///
    /// Returns an error if the boot signature is missing.
    pub fn parse(sector: &[u8; 512]) -> Result<Self> {
        let at = Self::BOOT_SIGNATURE_OFFSET;
        let boot_signature = u16::from_le_bytes([sector[at], sector[at + 1]]);
        if boot_signature != Self::BOOT_SIGNATURE {
            return Err(Error::invalid_zone_table(format!(
                "Invalid MBR boot signature: expected 0x{:04X}, got 0x{:04X}",
                Self::BOOT_SIGNATURE,
                boot_signature
            )));
        }

        let at = Self::DISK_SIGNATURE_OFFSET;
        let disk_signature =
            u32::from_le_bytes([sector[at], sector[at + 1], sector[at + 2], sector[at + 3]]);

        let records = std::array::from_fn(|i| {
            let offset = Self::PARTITION_TABLE_OFFSET + i * MbrPartitionRecord::SIZE;
            let mut raw = [0u8; 16];
            raw.copy_from_slice(&sector[offset..offset + MbrPartitionRecord::SIZE]);
            MbrPartitionRecord::parse(i as u32 + 1, &raw)
        });

        Ok(Self {
            records,
            disk_signature,
        })
    }

    pub fn disk_signature(&self) -> u32 {
        self.disk_signature
    }

    /// All four records, including empty ones
    pub fn records(&self) -> &[MbrPartitionRecord; 4] {
        &self.records
    }

    /// Check if this MBR contains a GPT protective partition
    ///
    /// A GPT protective partition indicates that this is actually a GPT disk
    /// with a protective MBR for backwards compatibility.
    pub fn is_protective(&self) -> bool {
        self.records
            .iter()
            .any(|r| r.partition_type == MbrPartitionType::GPT_PROTECTIVE)
    }

    /// Used primary partitions as scheme-neutral entries
    pub fn partition_entries(&self, sector_size: u32) -> Vec<PartitionEntry> {
        self.records
            .iter()
            .filter(|r| r.is_used())
            .map(|r| {
                PartitionEntry::new(
                    r.slot,
                    PartitionTypeId::Mbr(r.partition_type.0),
                    r.lba_start as u64,
                    r.lba_length as u64 * sector_size as u64,
                )
            })
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::mbr_sector;
    use super::*;
    use std::io::Cursor;

    fn parse(bytes: Vec<u8>) -> Result<MbrTable> {
        let sector = MbrTable::read_sector(&mut Cursor::new(bytes))?;
        MbrTable::parse(&sector)
    }

    #[test]
    fn test_parse_valid_mbr() {
        let table = parse(mbr_sector(&[(0x0C, 2048, 2048)])).unwrap();
        assert_eq!(table.disk_signature(), 0x78563412);
        assert!(!table.is_protective());

        let entries = table.partition_entries(512);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].index(), 1);
        assert_eq!(entries[0].first_lba(), 2048);
        assert_eq!(entries[0].size(), 2048 * 512);
        assert_eq!(entries[0].type_id(), PartitionTypeId::Mbr(0x0C));
    }

    #[test]
    fn test_slot_numbers_follow_disk_order() {
        let table = parse(mbr_sector(&[(0, 0, 0), (0x83, 2048, 100), (0x82, 4096, 100)])).unwrap();
        let slots: Vec<u32> = table.partition_entries(512).iter().map(|e| e.index()).collect();
        assert_eq!(slots, vec![2, 3]);
    }

    #[test]
    fn test_parse_invalid_boot_signature() {
        let mut bytes = mbr_sector(&[(0x0C, 2048, 2048)]);
        bytes[0x1FE] = 0x00;

        let result = parse(bytes);
        assert!(matches!(result, Err(Error::InvalidZoneTable(_))));
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid MBR boot signature"));
    }

    #[test]
    fn test_parse_empty_mbr() {
        let table = parse(mbr_sector(&[])).unwrap();
        assert!(table.partition_entries(512).is_empty());
    }

    #[test]
    fn test_gpt_protective_detection() {
        let table = parse(mbr_sector(&[(0xEE, 1, 0xFFFF_FFFF)])).unwrap();
        assert!(table.is_protective());
    }

    #[test]
    fn test_short_stream() {
        assert!(matches!(parse(vec![0u8; 100]), Err(Error::Io(_))));
    }
}
