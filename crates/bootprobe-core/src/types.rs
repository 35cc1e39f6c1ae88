//! Core types for image inspection

use std::fmt;
use uuid::Uuid;

/// Container format of a disk image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Plain sector image
    Raw,
    /// QEMU copy-on-write v2/v3
    Qcow2,
    /// Microsoft Virtual Hard Disk (fixed or dynamic)
    Vhd,
}

impl ImageFormat {
    /// Short lowercase name, as accepted on the command line
    pub fn name(&self) -> &'static str {
        match self {
            ImageFormat::Raw => "raw",
            ImageFormat::Qcow2 => "qcow2",
            ImageFormat::Vhd => "vhd",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Partitioning scheme of a parsed table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// GUID Partition Table
    Gpt,
    /// Legacy Master Boot Record
    Mbr,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Gpt => f.write_str("GPT"),
            Scheme::Mbr => f.write_str("MBR"),
        }
    }
}

/// Scheme-specific partition type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionTypeId {
    /// GPT partition type GUID, in canonical (not on-disk) byte order
    Gpt(Uuid),
    /// MBR one-byte system indicator
    Mbr(u8),
}

impl fmt::Display for PartitionTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionTypeId::Gpt(guid) => write!(f, "{:X}", guid.hyphenated()),
            PartitionTypeId::Mbr(code) => write!(f, "0x{:02X}", code),
        }
    }
}

/// One partition of a parsed table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    index: u32,
    type_id: PartitionTypeId,
    first_lba: u64,
    size: u64,
    name: Option<String>,
}

impl PartitionEntry {
    /// Create a new entry
    ///
    /// `index` is the 1-based on-disk slot number, `size` is in bytes.
    pub fn new(index: u32, type_id: PartitionTypeId, first_lba: u64, size: u64) -> Self {
        Self {
            index,
            type_id,
            first_lba,
            size,
            name: None,
        }
    }

    /// Attach the partition label (GPT only)
    pub fn with_name(mut self, name: String) -> Self {
        if !name.is_empty() {
            self.name = Some(name);
        }
        self
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn type_id(&self) -> PartitionTypeId {
        self.type_id
    }

    pub fn first_lba(&self) -> u64 {
        self.first_lba
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for PartitionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Partition {} [{} @ LBA {}, {}]",
            self.index,
            self.type_id,
            self.first_lba,
            format_size(self.size)
        )?;
        if let Some(ref name) = self.name {
            write!(f, " \"{}\"", name)?;
        }
        Ok(())
    }
}

/// A parsed partition table
///
/// Entries are kept in on-disk index order. The list may be empty; an
/// unreadable table is never represented as an empty one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTable {
    scheme: Scheme,
    sector_size: u32,
    entries: Vec<PartitionEntry>,
}

impl PartitionTable {
    pub fn new(scheme: Scheme, sector_size: u32, entries: Vec<PartitionEntry>) -> Self {
        Self {
            scheme,
            sector_size,
            entries,
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Logical sector size the table was read with
    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    pub fn entries(&self) -> &[PartitionEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of boot-mode detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootModeVerdict {
    /// An EFI System Partition was found
    UefiPresent,
    /// The table was read and holds no EFI System Partition
    UefiAbsent,
    /// Inspection failed before a table could be classified
    Indeterminate,
}

impl BootModeVerdict {
    /// Whether the image positively has an EFI System Partition
    pub fn has_uefi_partition(&self) -> bool {
        matches!(self, BootModeVerdict::UefiPresent)
    }
}

impl fmt::Display for BootModeVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootModeVerdict::UefiPresent => f.write_str("uefi-present"),
            BootModeVerdict::UefiAbsent => f.write_str("uefi-absent"),
            BootModeVerdict::Indeterminate => f.write_str("indeterminate"),
        }
    }
}

/// Format size in human-readable format
fn format_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536 * 1024), "1.50 MB");
    }

    #[test]
    fn test_type_id_display() {
        let esp = PartitionTypeId::Gpt(Uuid::from_u128(0xC12A7328_F81F_11D2_BA4B_00A0C93EC93B));
        assert_eq!(esp.to_string(), "C12A7328-F81F-11D2-BA4B-00A0C93EC93B");
        assert_eq!(PartitionTypeId::Mbr(0x83).to_string(), "0x83");
    }

    #[test]
    fn test_partition_entry() {
        let entry = PartitionEntry::new(2, PartitionTypeId::Mbr(0x07), 2048, 1024 * 1024)
            .with_name(String::new());
        assert_eq!(entry.index(), 2);
        assert_eq!(entry.size(), 1024 * 1024);
        assert!(entry.name().is_none());
        assert_eq!(entry.to_string(), "Partition 2 [0x07 @ LBA 2048, 1.00 MB]");
    }

    #[test]
    fn test_verdict() {
        assert!(BootModeVerdict::UefiPresent.has_uefi_partition());
        assert!(!BootModeVerdict::UefiAbsent.has_uefi_partition());
        assert!(!BootModeVerdict::Indeterminate.has_uefi_partition());
        assert_eq!(BootModeVerdict::UefiAbsent.to_string(), "uefi-absent");
    }

    #[test]
    fn test_empty_table() {
        let table = PartitionTable::new(Scheme::Mbr, 512, Vec::new());
        assert!(table.is_empty());
        assert_eq!(table.scheme(), Scheme::Mbr);
    }
}
