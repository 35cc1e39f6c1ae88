//! VHD (Virtual Hard Disk) on-disk structures
//!
//! All multi-byte fields are big-endian.

use bootprobe_core::{Error, Result};

/// VHD disk type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VhdType {
    Fixed,
    Dynamic,
    Differencing,
}

impl VhdType {
    /// Parse the disk type field of the footer
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            2 => Ok(VhdType::Fixed),
            3 => Ok(VhdType::Dynamic),
            4 => Ok(VhdType::Differencing),
            _ => Err(Error::invalid_vault(format!(
                "Invalid VHD disk type: {}",
                value
            ))),
        }
    }
}

/// One's complement of the byte sum, skipping the checksum field itself
fn ones_complement_checksum(bytes: &[u8], checksum_at: usize) -> u32 {
    let sum = bytes
        .iter()
        .enumerate()
        .filter(|(i, _)| !(checksum_at..checksum_at + 4).contains(i))
        .fold(0u32, |acc, (_, &b)| acc.wrapping_add(b as u32));
    !sum
}

fn be_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn be_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_be_bytes(raw)
}

/// VHD footer (512 bytes)
///
/// Present at the end of every VHD; dynamic disks also carry a copy at
/// offset 0.
#[derive(Debug, Clone)]
pub struct VhdFooter {
    pub data_offset: u64,
    pub current_size: u64,
    pub disk_type: VhdType,
    pub checksum: u32,
}

impl VhdFooter {
    /// VHD footer cookie value
    pub const COOKIE: &'static [u8; 8] = b"conectix";

    /// Size of the VHD footer in bytes
    pub const SIZE: usize = 512;

    const CHECKSUM_OFFSET: usize = 64;

    /// Parse and verify a footer
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(Error::invalid_vault("VHD footer too small"));
        }
        let bytes = &bytes[..Self::SIZE];

        if &bytes[0..8] != Self::COOKIE {
            return Err(Error::invalid_vault(format!(
                "Invalid VHD footer cookie: expected 'conectix', got '{}'",
                String::from_utf8_lossy(&bytes[0..8])
            )));
        }

        let checksum = be_u32(bytes, Self::CHECKSUM_OFFSET);
        let calculated = ones_complement_checksum(bytes, Self::CHECKSUM_OFFSET);
        if calculated != checksum {
            return Err(Error::checksum(format!(
                "VHD footer checksum 0x{:08X} does not match computed 0x{:08X}",
                checksum, calculated
            )));
        }

        Ok(Self {
            data_offset: be_u64(bytes, 16),
            current_size: be_u64(bytes, 48),
            disk_type: VhdType::from_u32(be_u32(bytes, 60))?,
            checksum,
        })
    }
}

/// VHD dynamic disk header (1024 bytes)
#[derive(Debug, Clone)]
pub struct VhdDynamicHeader {
    pub table_offset: u64,
    pub max_table_entries: u32,
    pub block_size: u32,
}

impl VhdDynamicHeader {
    /// VHD dynamic header cookie value
    pub const COOKIE: &'static [u8; 8] = b"cxsparse";

    /// Size of the VHD dynamic header in bytes
    pub const SIZE: usize = 1024;

    const CHECKSUM_OFFSET: usize = 36;

    /// Parse and verify a dynamic header
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(Error::invalid_vault("VHD dynamic header too small"));
        }
        let bytes = &bytes[..Self::SIZE];

        if &bytes[0..8] != Self::COOKIE {
            return Err(Error::invalid_vault(format!(
                "Invalid VHD dynamic header cookie: expected 'cxsparse', got '{}'",
                String::from_utf8_lossy(&bytes[0..8])
            )));
        }

        let checksum = be_u32(bytes, Self::CHECKSUM_OFFSET);
        if ones_complement_checksum(bytes, Self::CHECKSUM_OFFSET) != checksum {
            return Err(Error::checksum("VHD dynamic header checksum mismatch"));
        }

        let block_size = be_u32(bytes, 32);
        if block_size < 512 || !block_size.is_power_of_two() {
            return Err(Error::invalid_vault(format!(
                "Invalid VHD block size: {}",
                block_size
            )));
        }

        Ok(Self {
            table_offset: be_u64(bytes, 16),
            max_table_entries: be_u32(bytes, 28),
            block_size,
        })
    }

    /// Size of the sector bitmap that precedes every data block
    pub fn bitmap_size(&self) -> u64 {
        let bits = self.block_size as u64 / 512;
        let bytes = bits.div_ceil(8);
        bytes.div_ceil(512) * 512
    }
}

/// Block Allocation Table for dynamic VHDs
///
/// Each entry is the 512-byte sector offset of a block, or `0xFFFFFFFF` for
/// a block that was never written.
#[derive(Debug, Clone)]
pub struct BlockAllocationTable {
    pub entries: Vec<u32>,
    pub block_size: u32,
}

impl BlockAllocationTable {
    const UNALLOCATED: u32 = 0xFFFF_FFFF;

    /// Parse BAT from raw bytes
    pub fn parse(bytes: &[u8], block_size: u32) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(Error::invalid_vault("BAT size must be multiple of 4"));
        }

        let entries = bytes.chunks_exact(4).map(|c| be_u32(c, 0)).collect();

        Ok(Self {
            entries,
            block_size,
        })
    }

    /// Byte offset of a block in the file, `None` if it is sparse
    pub fn get_block_offset(&self, block_index: u64) -> Option<u64> {
        let entry = *self.entries.get(usize::try_from(block_index).ok()?)?;
        if entry == Self::UNALLOCATED {
            None
        } else {
            Some(entry as u64 * 512)
        }
    }

    /// Calculate the block index for a virtual offset
    pub fn offset_to_block(&self, offset: u64) -> u64 {
        offset / self.block_size as u64
    }

    /// Calculate the offset within a block
    pub fn offset_within_block(&self, offset: u64) -> u64 {
        offset % self.block_size as u64
    }
}

/// Fixtures shared by the VHD tests
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    fn seal(bytes: &mut [u8], checksum_at: usize) {
        bytes[checksum_at..checksum_at + 4].fill(0);
        let sum = ones_complement_checksum(bytes, checksum_at);
        bytes[checksum_at..checksum_at + 4].copy_from_slice(&sum.to_be_bytes());
    }

    /// Footer with a valid checksum
    pub fn footer(current_size: u64, disk_type: u32, data_offset: u64) -> [u8; 512] {
        let mut bytes = [0u8; 512];
        bytes[0..8].copy_from_slice(VhdFooter::COOKIE);
        bytes[8..12].copy_from_slice(&2u32.to_be_bytes());
        bytes[12..16].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        bytes[16..24].copy_from_slice(&data_offset.to_be_bytes());
        bytes[40..48].copy_from_slice(&current_size.to_be_bytes());
        bytes[48..56].copy_from_slice(&current_size.to_be_bytes());
        bytes[60..64].copy_from_slice(&disk_type.to_be_bytes());
        seal(&mut bytes, VhdFooter::CHECKSUM_OFFSET);
        bytes
    }

    /// Dynamic header with a valid checksum
    pub fn dynamic_header(table_offset: u64, max_entries: u32, block_size: u32) -> [u8; 1024] {
        let mut bytes = [0u8; 1024];
        bytes[0..8].copy_from_slice(VhdDynamicHeader::COOKIE);
        bytes[8..16].copy_from_slice(&u64::MAX.to_be_bytes());
        bytes[16..24].copy_from_slice(&table_offset.to_be_bytes());
        bytes[24..28].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        bytes[28..32].copy_from_slice(&max_entries.to_be_bytes());
        bytes[32..36].copy_from_slice(&block_size.to_be_bytes());
        seal(&mut bytes, VhdDynamicHeader::CHECKSUM_OFFSET);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vhd_type_from_u32() {
        assert_eq!(VhdType::from_u32(2).unwrap(), VhdType::Fixed);
        assert_eq!(VhdType::from_u32(3).unwrap(), VhdType::Dynamic);
        assert_eq!(VhdType::from_u32(4).unwrap(), VhdType::Differencing);
        assert!(VhdType::from_u32(0).is_err());
        assert!(VhdType::from_u32(99).is_err());
    }

    #[test]
    fn test_vhd_footer_parse() {
        let bytes = fixtures::footer(1 << 20, 2, u64::MAX);
        let footer = VhdFooter::parse(&bytes).unwrap();
        assert_eq!(footer.current_size, 1 << 20);
        assert_eq!(footer.disk_type, VhdType::Fixed);
    }

    #[test]
    fn test_vhd_footer_checksum_mismatch() {
        let mut bytes = fixtures::footer(1 << 20, 2, u64::MAX);
        bytes[50] ^= 0x01;
        assert!(matches!(
            VhdFooter::parse(&bytes),
            Err(Error::ChecksumVerification(_))
        ));
    }

    #[test]
    fn test_vhd_footer_invalid_cookie() {
        let mut bytes = [0u8; 512];
        bytes[0..8].copy_from_slice(b"notvalid");
        assert!(VhdFooter::parse(&bytes).is_err());
        assert!(VhdFooter::parse(&bytes[..100]).is_err());
    }

    #[test]
    fn test_vhd_dynamic_header_parse() {
        let bytes = fixtures::dynamic_header(1536, 4, 2 * 1024 * 1024);
        let header = VhdDynamicHeader::parse(&bytes).unwrap();
        assert_eq!(header.table_offset, 1536);
        assert_eq!(header.max_table_entries, 4);
        assert_eq!(header.bitmap_size(), 512);

        let bad = fixtures::dynamic_header(1536, 4, 1000);
        assert!(VhdDynamicHeader::parse(&bad).is_err());
    }

    #[test]
    fn test_bat_lookup() {
        let mut bytes = vec![0u8; 12];
        bytes[0..4].copy_from_slice(&0x0000_1000u32.to_be_bytes());
        bytes[4..8].copy_from_slice(&0xFFFF_FFFFu32.to_be_bytes());
        bytes[8..12].copy_from_slice(&0x0000_2000u32.to_be_bytes());

        let bat = BlockAllocationTable::parse(&bytes, 2 * 1024 * 1024).unwrap();

        assert_eq!(bat.get_block_offset(0), Some(0x1000 * 512));
        assert_eq!(bat.get_block_offset(1), None);
        assert_eq!(bat.get_block_offset(2), Some(0x2000 * 512));
        assert_eq!(bat.get_block_offset(3), None);

        assert_eq!(bat.offset_to_block(2 * 1024 * 1024 + 500), 1);
        assert_eq!(bat.offset_within_block(2 * 1024 * 1024 + 500), 500);
    }
}
