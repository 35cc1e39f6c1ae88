//! Partition table discovery
//!
//! A GPT is only read when LBA 0 holds a protective MBR or no MBR at all. A
//! valid MBR without a protective record wins over any GPT header behind it,
//! and a protective MBR without a valid GPT header is treated as corruption.

use crate::gpt::GptTable;
use crate::mbr::MbrTable;
use bootprobe_core::{
    validate_sector_size, Error, PartitionTable, PartitionTableError, ReadSeek, Scheme, Vault,
};

/// Logical sector size to read the table with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SectorSize {
    /// Try 512, then 4096
    #[default]
    Probe,
    Fixed(u32),
}

impl SectorSize {
    /// Sector sizes probed when none is configured
    pub const PROBE_ORDER: [u32; 2] = [512, 4096];

    fn candidates(self) -> Result<Vec<u32>, Error> {
        match self {
            SectorSize::Probe => Ok(Self::PROBE_ORDER.to_vec()),
            SectorSize::Fixed(size) => {
                validate_sector_size(size)?;
                Ok(vec![size])
            }
        }
    }
}

/// Options for [`read_partition_table`]
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub sector_size: SectorSize,
}

/// Read the partition table of a disk image
///
/// # Errors
///
/// Returns a [`PartitionTableError`] if:
/// - A GPT signature is present but the header or entry array is invalid
/// - A protective MBR is present but no GPT header is found
/// - Neither a GPT nor an MBR boot signature is present
/// - The image cannot be read
pub fn read_partition_table(
    vault: &mut dyn Vault,
    options: &ReadOptions,
) -> Result<PartitionTable, PartitionTableError> {
    let image_len = vault.length();
    let candidates = options.sector_size.candidates()?;
    if image_len < MbrTable::MBR_SIZE as u64 {
        return Err(Error::invalid_zone_table(format!(
            "Image of {} bytes is too small to hold a partition table",
            image_len
        ))
        .into());
    }

    let stream = vault.content();
    let lba0 = MbrTable::read_sector(stream)?;
    let mbr = MbrTable::parse(&lba0);
    let protective = mbr.as_ref().map(MbrTable::is_protective).unwrap_or(false);
    tracing::debug!(boot_signature = mbr.is_ok(), protective, "Read LBA 0");

    if let Ok(mbr) = mbr.as_ref() {
        if !protective {
            warn_stale_gpt(stream, image_len, &candidates)?;
            let sector_size = match options.sector_size {
                SectorSize::Fixed(size) => size,
                SectorSize::Probe => MbrTable::MBR_SIZE as u32,
            };
            tracing::info!("Using MBR partition records");
            let table =
                PartitionTable::new(Scheme::Mbr, sector_size, mbr.partition_entries(sector_size));
            warn_out_of_range(&table, image_len);
            return Ok(table);
        }
    }

    for sector_size in candidates {
        if !GptTable::probe(stream, image_len, sector_size)? {
            continue;
        }
        tracing::info!(sector_size, "Found GPT header signature");
        let gpt = GptTable::parse(stream, image_len, sector_size)?;
        let table = PartitionTable::new(Scheme::Gpt, sector_size, gpt.partition_entries());
        warn_out_of_range(&table, image_len);
        return Ok(table);
    }

    match mbr {
        Ok(_) => Err(Error::invalid_zone_table(
            "Protective MBR present but no GPT header was found",
        )
        .into()),
        Err(e) => Err(Error::invalid_zone_table(format!(
            "No recognizable partition table ({})",
            e
        ))
        .into()),
    }
}

/// Log a GPT header left behind a regular MBR; firmware ignores it
fn warn_stale_gpt(
    stream: &mut dyn ReadSeek,
    image_len: u64,
    candidates: &[u32],
) -> Result<(), PartitionTableError> {
    for &sector_size in candidates {
        if GptTable::probe(stream, image_len, sector_size)? {
            tracing::warn!(sector_size, "Ignoring GPT header behind a non-protective MBR");
            break;
        }
    }
    Ok(())
}

/// Log partitions whose extent runs past the end of the image
fn warn_out_of_range(table: &PartitionTable, image_len: u64) {
    let sector_size = table.sector_size() as u64;
    for entry in table.entries() {
        let end = entry
            .first_lba()
            .checked_mul(sector_size)
            .and_then(|start| start.checked_add(entry.size()));
        if end.map_or(true, |end| end > image_len) {
            tracing::warn!(
                partition = entry.index(),
                first_lba = entry.first_lba(),
                size = entry.size(),
                image_len,
                "Partition extends past the end of the image"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpt::fixtures::{gpt_disk, reseal_header, Part};
    use crate::gpt::types::PartitionTypeGuid;
    use crate::mbr::fixtures::mbr_sector;
    use bootprobe_core::{ImageFormat, PartitionTypeId, ReadSeek};
    use std::io::Cursor;

    /// In-memory vault over a byte buffer
    struct MemVault(Cursor<Vec<u8>>);

    impl MemVault {
        fn new(bytes: Vec<u8>) -> Self {
            Self(Cursor::new(bytes))
        }
    }

    impl Vault for MemVault {
        fn identify(&self) -> &str {
            "memory"
        }

        fn format(&self) -> ImageFormat {
            ImageFormat::Raw
        }

        fn length(&self) -> u64 {
            self.0.get_ref().len() as u64
        }

        fn content(&mut self) -> &mut dyn ReadSeek {
            &mut self.0
        }
    }

    fn read(bytes: Vec<u8>) -> Result<PartitionTable, PartitionTableError> {
        read_partition_table(&mut MemVault::new(bytes), &ReadOptions::default())
    }

    fn esp_disk() -> Vec<u8> {
        gpt_disk(512, 2048, &[Part::new(PartitionTypeGuid::EFI_SYSTEM, 40, 239)])
    }

    #[test]
    fn test_reads_gpt() {
        let table = read(esp_disk()).unwrap();
        assert_eq!(table.scheme(), Scheme::Gpt);
        assert_eq!(table.sector_size(), 512);
        assert_eq!(table.entries().len(), 1);
    }

    #[test]
    fn test_probes_4k_sectors() {
        let disk = gpt_disk(4096, 256, &[Part::new(PartitionTypeGuid::EFI_SYSTEM, 6, 69)]);
        let table = read(disk).unwrap();
        assert_eq!(table.scheme(), Scheme::Gpt);
        assert_eq!(table.sector_size(), 4096);
    }

    #[test]
    fn test_fixed_sector_size_skips_probe() {
        let disk = gpt_disk(4096, 256, &[Part::new(PartitionTypeGuid::EFI_SYSTEM, 6, 69)]);
        let options = ReadOptions {
            sector_size: SectorSize::Fixed(512),
        };
        // Only a protective MBR is visible at 512-byte sectors
        assert!(read_partition_table(&mut MemVault::new(disk), &options).is_err());
    }

    #[test]
    fn test_invalid_fixed_sector_size() {
        let options = ReadOptions {
            sector_size: SectorSize::Fixed(1000),
        };
        assert!(read_partition_table(&mut MemVault::new(esp_disk()), &options).is_err());
    }

    #[test]
    fn test_reads_mbr() {
        let mut disk = mbr_sector(&[(0x83, 2048, 2048)]);
        disk.resize(4096 * 512, 0);
        let table = read(disk).unwrap();
        assert_eq!(table.scheme(), Scheme::Mbr);
        assert_eq!(table.entries()[0].type_id(), PartitionTypeId::Mbr(0x83));
    }

    #[test]
    fn test_regular_mbr_hides_stale_gpt() {
        let mut disk = esp_disk();
        disk[..512].copy_from_slice(&mbr_sector(&[(0x83, 40, 239)]));
        let table = read(disk).unwrap();
        assert_eq!(table.scheme(), Scheme::Mbr);
        assert_eq!(table.entries().len(), 1);
        assert_eq!(table.entries()[0].type_id(), PartitionTypeId::Mbr(0x83));
    }

    #[test]
    fn test_corrupt_gpt_does_not_fall_back() {
        let mut disk = esp_disk();
        disk[512 + 40] ^= 0xFF;
        let err = read(disk).unwrap_err();
        assert!(matches!(err.cause(), Error::ChecksumVerification(_)));
    }

    #[test]
    fn test_protective_mbr_without_gpt_header() {
        let mut disk = esp_disk();
        disk[512..520].fill(0);
        let err = read(disk).unwrap_err();
        assert!(matches!(err.cause(), Error::InvalidZoneTable(_)));
    }

    #[test]
    fn test_gpt_without_protective_mbr() {
        let mut disk = esp_disk();
        disk[..512].fill(0);
        let table = read(disk).unwrap();
        assert_eq!(table.scheme(), Scheme::Gpt);
    }

    #[test]
    fn test_no_partition_table() {
        let err = read(vec![0u8; 8192]).unwrap_err();
        assert!(matches!(err.cause(), Error::InvalidZoneTable(_)));
    }

    #[test]
    fn test_image_too_small() {
        assert!(read(vec![0u8; 100]).is_err());
    }

    #[test]
    fn test_entry_array_beyond_image() {
        let mut disk = esp_disk();
        disk[512 + 72..512 + 80].copy_from_slice(&4000u64.to_le_bytes());
        reseal_header(&mut disk, 512);
        let err = read(disk).unwrap_err();
        assert!(matches!(err.cause(), Error::OutOfBounds(_)));
    }

    #[test]
    fn test_partition_past_end_is_tolerated() {
        let disk = gpt_disk(512, 2048, &[Part::new(PartitionTypeGuid::EFI_SYSTEM, 40, 99_999)]);
        let table = read(disk).unwrap();
        assert_eq!(table.entries()[0].size(), 99_960 * 512);
    }

    #[test]
    fn test_repeated_reads_agree() {
        let mut vault = MemVault::new(esp_disk());
        let first = read_partition_table(&mut vault, &ReadOptions::default()).unwrap();
        let second = read_partition_table(&mut vault, &ReadOptions::default()).unwrap();
        assert_eq!(first, second);
    }
}
