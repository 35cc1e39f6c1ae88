//! qcow2 header structure
//!
//! All multi-byte fields are big-endian. Only the fields needed to map guest
//! offsets to file offsets are kept.

use bootprobe_core::{Error, Result};

/// Incompatible feature bits (version 3)
pub mod incompatible {
    pub const DIRTY: u64 = 1 << 0;
    pub const CORRUPT: u64 = 1 << 1;
    pub const EXTERNAL_DATA_FILE: u64 = 1 << 2;
    pub const COMPRESSION_TYPE: u64 = 1 << 3;
    pub const EXTENDED_L2: u64 = 1 << 4;

    pub const KNOWN: u64 = DIRTY | CORRUPT | EXTERNAL_DATA_FILE | COMPRESSION_TYPE | EXTENDED_L2;
}

/// Mask of the host cluster offset in L1 and standard L2 entries (bits 9-55)
pub const OFFSET_MASK: u64 = 0x00FF_FFFF_FFFF_FE00;

/// L2 entry flag: cluster is compressed
pub const L2_COMPRESSED: u64 = 1 << 62;

/// L2 entry flag: cluster reads as zeros (version 3)
pub const L2_ZERO: u64 = 1;

/// qcow2 header
#[derive(Debug, Clone)]
pub struct QcowHeader {
    pub version: u32,
    pub cluster_bits: u32,
    pub size: u64,
    pub l1_size: u32,
    pub l1_table_offset: u64,
    pub incompatible_features: u64,
}

impl QcowHeader {
    /// Header magic "QFI\xfb"
    pub const MAGIC: &'static [u8; 4] = b"QFI\xfb";

    /// Size of a version 2 header
    pub const V2_SIZE: usize = 72;

    /// Size of a version 3 header without optional fields
    pub const V3_SIZE: usize = 104;

    pub const MIN_CLUSTER_BITS: u32 = 9;
    pub const MAX_CLUSTER_BITS: u32 = 21;

    /// Parse and validate a header
    ///
    /// `bytes` should hold at least the first 112 bytes of the file when
    /// available.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::V2_SIZE {
            return Err(Error::invalid_vault("File too small to be a qcow2 image"));
        }

        if &bytes[0..4] != Self::MAGIC {
            return Err(Error::invalid_vault("Invalid qcow2 magic"));
        }

        let version = be_u32(bytes, 4);
        let backing_file_offset = be_u64(bytes, 8);
        let cluster_bits = be_u32(bytes, 20);
        let size = be_u64(bytes, 24);
        let crypt_method = be_u32(bytes, 32);
        let l1_size = be_u32(bytes, 36);
        let l1_table_offset = be_u64(bytes, 40);

        if !(2..=3).contains(&version) {
            return Err(Error::unsupported(format!("qcow2 version {}", version)));
        }

        if !(Self::MIN_CLUSTER_BITS..=Self::MAX_CLUSTER_BITS).contains(&cluster_bits) {
            return Err(Error::invalid_vault(format!(
                "qcow2 cluster_bits {} outside {}..={}",
                cluster_bits,
                Self::MIN_CLUSTER_BITS,
                Self::MAX_CLUSTER_BITS
            )));
        }

        if crypt_method != 0 {
            return Err(Error::unsupported("Encrypted qcow2 images"));
        }

        if backing_file_offset != 0 {
            return Err(Error::unsupported(
                "qcow2 image with a backing file requires its backing chain",
            ));
        }

        let incompatible_features = if version >= 3 {
            if bytes.len() < Self::V3_SIZE {
                return Err(Error::invalid_vault("Truncated qcow2 version 3 header"));
            }
            let header_length = be_u32(bytes, 100) as usize;
            if header_length < Self::V3_SIZE {
                return Err(Error::invalid_vault(format!(
                    "qcow2 header length {} is shorter than {}",
                    header_length,
                    Self::V3_SIZE
                )));
            }
            let features = be_u64(bytes, 72);
            Self::check_features(features, header_length, bytes)?;
            features
        } else {
            0
        };

        Ok(Self {
            version,
            cluster_bits,
            size,
            l1_size,
            l1_table_offset,
            incompatible_features,
        })
    }

    fn check_features(features: u64, header_length: usize, bytes: &[u8]) -> Result<()> {
        let unknown = features & !incompatible::KNOWN;
        if unknown != 0 {
            return Err(Error::unsupported(format!(
                "qcow2 incompatible feature bits 0x{:X}",
                unknown
            )));
        }
        if features & incompatible::CORRUPT != 0 {
            return Err(Error::invalid_vault("qcow2 image is marked corrupt"));
        }
        if features & incompatible::EXTERNAL_DATA_FILE != 0 {
            return Err(Error::unsupported("qcow2 external data file"));
        }
        if features & incompatible::EXTENDED_L2 != 0 {
            return Err(Error::unsupported("qcow2 extended L2 entries"));
        }
        if features & incompatible::COMPRESSION_TYPE != 0 {
            // Compression type byte follows the fixed v3 fields
            let compression = if header_length > Self::V3_SIZE && bytes.len() > Self::V3_SIZE {
                bytes[Self::V3_SIZE]
            } else {
                0
            };
            if compression != 0 {
                return Err(Error::unsupported(format!(
                    "qcow2 compression type {}",
                    compression
                )));
            }
        }
        Ok(())
    }

    pub fn cluster_size(&self) -> u64 {
        1u64 << self.cluster_bits
    }

    /// Number of 8-byte entries in one L2 table
    pub fn l2_entries(&self) -> u64 {
        self.cluster_size() / 8
    }

    /// L1 entries needed to cover the whole guest size
    pub fn required_l1_size(&self) -> u64 {
        let per_l1 = self.cluster_size() * self.l2_entries();
        self.size.div_ceil(per_l1)
    }

    pub fn is_dirty(&self) -> bool {
        self.incompatible_features & incompatible::DIRTY != 0
    }
}

pub(crate) fn be_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

pub(crate) fn be_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_be_bytes(raw)
}
