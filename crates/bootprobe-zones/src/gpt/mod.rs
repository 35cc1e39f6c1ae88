//! GPT (GUID Partition Table) partition table implementation

pub mod types;

use bootprobe_core::{
    checked_add_u64, checked_multiply_u64, ensure_within, validate_allocation_size,
    validate_sector_size, Error, PartitionEntry, PartitionTypeId, ReadSeek, Result,
    MAX_ALLOCATION_SIZE,
};
use std::io::SeekFrom;
use types::{GptHeader, GptPartitionEntry};

/// GPT partition table
///
/// # Structure
///
/// ```text
/// LBA 0:    Protective MBR (for backward compatibility)
/// LBA 1:    Primary GPT header
/// LBA 2-33: Partition entries array (typically 128 entries)
/// LBA 34+:  Usable disk space
/// ...
/// Last 33:  Backup partition entries array
/// Last 1:   Backup GPT header
/// ```
///
/// Only the primary header is read. A primary header that fails validation
/// is an error even when the backup copy may be intact.
#[derive(Debug, Clone)]
pub struct GptTable {
    header: GptHeader,
    sector_size: u32,
    /// Used entries with their 1-based slot number
    entries: Vec<(u32, GptPartitionEntry)>,
}

impl GptTable {
    /// LBA of the primary header
    pub const HEADER_LBA: u64 = 1;

    /// Smallest partition entry size the UEFI specification allows
    pub const MIN_ENTRY_SIZE: u32 = 128;

    /// Whether a GPT header signature sits at LBA 1 for this sector size
    pub fn probe(stream: &mut dyn ReadSeek, image_len: u64, sector_size: u32) -> Result<bool> {
        let offset = Self::HEADER_LBA * sector_size as u64;
        let signature_len = GptHeader::SIGNATURE.len() as u64;
        if ensure_within(offset, signature_len, image_len, "GPT signature").is_err() {
            return Ok(false);
        }

        stream.seek(SeekFrom::Start(offset))?;
        let mut signature = [0u8; 8];
        stream.read_exact(&mut signature)?;
        Ok(GptHeader::has_signature(&signature))
    }

    /// Parse and validate the primary GPT
    ///
    /// # Arguments
    ///
    /// * `stream` - guest-visible disk contents
    /// * `image_len` - size of the guest disk; no read goes past it
    /// * `sector_size` - logical sector size in bytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The header signature, size, location or CRC32 is invalid
    /// - The partition entry size or count is invalid
    /// - The entry array lies outside the image or exceeds the allocation limit
    /// - The entry array CRC32 does not match
    pub fn parse(stream: &mut dyn ReadSeek, image_len: u64, sector_size: u32) -> Result<Self> {
        validate_sector_size(sector_size)?;

        let header_offset = Self::HEADER_LBA * sector_size as u64;
        ensure_within(header_offset, sector_size as u64, image_len, "GPT header")?;

        stream.seek(SeekFrom::Start(header_offset))?;
        let mut header_bytes = vec![0u8; sector_size as usize];
        stream.read_exact(&mut header_bytes)?;

        let header = GptHeader::parse(&header_bytes)?;
        tracing::debug!(
            revision = format_args!("0x{:08X}", header.revision),
            header_size = header.header_size,
            entries_lba = header.partition_entries_lba,
            entries = header.num_partition_entries,
            entry_size = header.partition_entry_size,
            disk_guid = %header.disk_guid,
            "GPT header"
        );

        let header_size = header.header_size;
        if header_size < GptHeader::HEADER_SIZE as u32 || header_size > sector_size {
            return Err(Error::invalid_zone_table(format!(
                "GPT header size {} outside {}..={}",
                header_size,
                GptHeader::HEADER_SIZE,
                sector_size
            )));
        }

        if !header.verify_header_crc32(&header_bytes) {
            return Err(Error::checksum("GPT header CRC32 verification failed"));
        }

        if header.my_lba != Self::HEADER_LBA {
            return Err(Error::invalid_zone_table(format!(
                "GPT header claims to be at LBA {} but was read from LBA {}",
                header.my_lba,
                Self::HEADER_LBA
            )));
        }

        let entry_size = header.partition_entry_size;
        if entry_size < Self::MIN_ENTRY_SIZE || entry_size % 8 != 0 {
            return Err(Error::invalid_zone_table(format!(
                "Invalid GPT partition entry size: {}",
                entry_size
            )));
        }

        let count = header.num_partition_entries;
        if count == 0 {
            return Err(Error::invalid_zone_table("GPT declares no partition entries"));
        }

        let array_len =
            checked_multiply_u64(count as u64, entry_size as u64, "GPT entry array size")?;
        let array_offset = checked_multiply_u64(
            header.partition_entries_lba,
            sector_size as u64,
            "GPT entry array offset",
        )?;
        checked_add_u64(array_offset, array_len, "GPT entry array end")?;
        let array_len =
            validate_allocation_size(array_len, MAX_ALLOCATION_SIZE, "GPT entry array")?;
        ensure_within(array_offset, array_len as u64, image_len, "GPT entry array")?;

        stream.seek(SeekFrom::Start(array_offset))?;
        let mut array = vec![0u8; array_len];
        stream.read_exact(&mut array)?;

        if !header.verify_partition_entries_crc32(&array) {
            return Err(Error::checksum(
                "GPT partition entries CRC32 verification failed",
            ));
        }

        let mut entries = Vec::new();
        for (slot, bytes) in array.chunks_exact(entry_size as usize).enumerate() {
            let entry = GptPartitionEntry::parse(bytes)?;
            if entry.is_unused() {
                continue;
            }
            entries.push((slot as u32 + 1, entry));
        }

        Ok(Self {
            header,
            sector_size,
            entries,
        })
    }

    pub fn header(&self) -> &GptHeader {
        &self.header
    }

    /// Used entries with their 1-based slot numbers
    pub fn entries(&self) -> &[(u32, GptPartitionEntry)] {
        &self.entries
    }

    /// Convert the used entries into scheme-neutral partition entries
    pub fn partition_entries(&self) -> Vec<PartitionEntry> {
        self.entries
            .iter()
            .map(|(slot, entry)| {
                let size = entry.size_lba().saturating_mul(self.sector_size as u64);
                PartitionEntry::new(
                    *slot,
                    PartitionTypeId::Gpt(entry.partition_type_guid.to_uuid()),
                    entry.first_lba,
                    size,
                )
                .with_name(entry.name.clone())
            })
            .collect()
    }
}
