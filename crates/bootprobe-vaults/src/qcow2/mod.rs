//! qcow2 vault implementation
//!
//! Guest offsets are translated through a two-level table: the L1 table,
//! read once at open, points at L2 tables, whose entries point at data
//! clusters. Clusters that were never written, or that carry the zero flag,
//! read as zeros. Compressed clusters are raw deflate streams.
//!
//! Every host offset taken from the image is checked against the file length
//! before it is read.

pub mod types;

use bootprobe_core::{
    checked_multiply_u64, ensure_within, validate_allocation_size, Error, ImageFormat, ReadSeek,
    Result, Vault, MAX_ALLOCATION_SIZE,
};
use flate2::read::DeflateDecoder;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use types::{be_u64, QcowHeader, L2_COMPRESSED, L2_ZERO, OFFSET_MASK};

use crate::raw::{file_stream, VaultConfig};

/// qcow2 vault - QEMU copy-on-write container (versions 2 and 3)
pub struct Qcow2Vault {
    pipeline: Box<dyn ReadSeek>,
    header: QcowHeader,
}

impl Qcow2Vault {
    /// Open a qcow2 vault over an already opened file
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid or uses an unsupported
    /// feature, or if the L1 table does not fit in the file.
    pub fn open(file: File, config: &VaultConfig) -> Result<Self> {
        let mut stream = file_stream(file, config)?;
        let file_len = stream.seek(SeekFrom::End(0))?;

        let header_len = file_len.min(112) as usize;
        let mut header_bytes = vec![0u8; header_len];
        stream.seek(SeekFrom::Start(0))?;
        stream.read_exact(&mut header_bytes)?;
        let header = QcowHeader::parse(&header_bytes)?;

        if header.is_dirty() {
            tracing::warn!("qcow2 image was not closed cleanly; refcounts may be stale");
        }

        let l1 = Self::read_l1_table(&mut *stream, &header, file_len)?;

        tracing::debug!(
            version = header.version,
            cluster_size = header.cluster_size(),
            virtual_size = header.size,
            l1_entries = l1.len(),
            "parsed qcow2 header"
        );

        let pipeline = Box::new(Qcow2Pipeline {
            base: stream,
            l1,
            cluster_bits: header.cluster_bits,
            zero_flag: header.version >= 3,
            file_len,
            virtual_size: header.size,
            position: 0,
            l2_cache: None,
            cluster_cache: None,
        });

        Ok(Self { pipeline, header })
    }

    fn read_l1_table(
        stream: &mut dyn ReadSeek,
        header: &QcowHeader,
        file_len: u64,
    ) -> Result<Vec<u64>> {
        let l1_size = header.l1_size as u64;
        if l1_size < header.required_l1_size() {
            return Err(Error::invalid_vault(format!(
                "qcow2 L1 table has {} entries, {} needed for {} bytes",
                l1_size,
                header.required_l1_size(),
                header.size
            )));
        }

        if header.l1_table_offset % header.cluster_size() != 0 {
            return Err(Error::invalid_vault("qcow2 L1 table is not cluster aligned"));
        }

        let l1_len = checked_multiply_u64(l1_size, 8, "qcow2 L1 table")?;
        ensure_within(header.l1_table_offset, l1_len, file_len, "qcow2 L1 table")?;
        let l1_len = validate_allocation_size(l1_len, MAX_ALLOCATION_SIZE, "qcow2 L1 table")?;

        stream.seek(SeekFrom::Start(header.l1_table_offset))?;
        let mut raw = vec![0u8; l1_len];
        stream.read_exact(&mut raw)?;

        Ok(raw
            .chunks_exact(8)
            .map(|c| be_u64(c, 0) & OFFSET_MASK)
            .collect())
    }

    /// Get the parsed header
    pub fn header(&self) -> &QcowHeader {
        &self.header
    }
}

impl Vault for Qcow2Vault {
    fn identify(&self) -> &str {
        match self.header.version {
            2 => "QEMU qcow2 (v2)",
            _ => "QEMU qcow2 (v3)",
        }
    }

    fn format(&self) -> ImageFormat {
        ImageFormat::Qcow2
    }

    fn length(&self) -> u64 {
        self.header.size
    }

    fn content(&mut self) -> &mut dyn ReadSeek {
        &mut *self.pipeline
    }
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Guest view of a qcow2 file
struct Qcow2Pipeline<R: Read + Seek> {
    base: R,
    l1: Vec<u64>,
    cluster_bits: u32,
    zero_flag: bool,
    file_len: u64,
    virtual_size: u64,
    position: u64,
    /// Last L2 table read: (host offset, entries)
    l2_cache: Option<(u64, Vec<u64>)>,
    /// Last compressed cluster inflated: (L2 entry, data)
    cluster_cache: Option<(u64, Vec<u8>)>,
}

impl<R: Read + Seek> Qcow2Pipeline<R> {
    fn cluster_size(&self) -> u64 {
        1u64 << self.cluster_bits
    }

    fn check_host_range(&self, offset: u64, len: u64, what: &str) -> io::Result<()> {
        ensure_within(offset, len, self.file_len, what).map_err(|e| invalid_data(e.to_string()))
    }

    /// Look up the L2 entry for a guest cluster, 0 if unallocated
    fn l2_entry(&mut self, guest_cluster: u64) -> io::Result<u64> {
        let l2_entries = self.cluster_size() / 8;
        let l1_index = guest_cluster / l2_entries;
        let l2_index = (guest_cluster % l2_entries) as usize;

        let l2_offset = match usize::try_from(l1_index).ok().and_then(|i| self.l1.get(i)) {
            Some(&offset) if offset != 0 => offset,
            _ => return Ok(0),
        };

        let cached = matches!(&self.l2_cache, Some((offset, _)) if *offset == l2_offset);
        if !cached {
            if l2_offset % self.cluster_size() != 0 {
                return Err(invalid_data(format!(
                    "qcow2 L2 table at 0x{:X} is not cluster aligned",
                    l2_offset
                )));
            }
            self.check_host_range(l2_offset, self.cluster_size(), "qcow2 L2 table")?;

            let mut raw = vec![0u8; self.cluster_size() as usize];
            self.base.seek(SeekFrom::Start(l2_offset))?;
            self.base.read_exact(&mut raw)?;
            let table = raw.chunks_exact(8).map(|c| be_u64(c, 0)).collect();
            self.l2_cache = Some((l2_offset, table));
        }

        Ok(self
            .l2_cache
            .as_ref()
            .map(|(_, table)| table[l2_index])
            .unwrap_or(0))
    }

    /// Inflate a compressed cluster described by an L2 entry
    fn compressed_cluster(&mut self, entry: u64) -> io::Result<&[u8]> {
        let cached = matches!(&self.cluster_cache, Some((e, _)) if *e == entry);
        if !cached {
            let cluster_size = self.cluster_size();
            let offset_bits = 62 - (self.cluster_bits - 8);
            let host_offset = entry & ((1u64 << offset_bits) - 1);
            let sector_mask = (1u64 << (self.cluster_bits - 8)) - 1;
            let sectors = ((entry >> offset_bits) & sector_mask) + 1;

            // The declared length may run past EOF for the last cluster
            let declared = sectors * 512 - (host_offset & 511);
            let available = self.file_len.saturating_sub(host_offset);
            let compressed_len = declared.min(available);
            if compressed_len == 0 {
                return Err(invalid_data(format!(
                    "qcow2 compressed cluster at 0x{:X} lies outside the file",
                    host_offset
                )));
            }

            let mut compressed = vec![0u8; compressed_len as usize];
            self.base.seek(SeekFrom::Start(host_offset))?;
            self.base.read_exact(&mut compressed)?;

            let mut data = Vec::with_capacity(cluster_size as usize);
            DeflateDecoder::new(&compressed[..])
                .take(cluster_size)
                .read_to_end(&mut data)?;
            if data.len() as u64 != cluster_size {
                return Err(invalid_data(format!(
                    "qcow2 compressed cluster at 0x{:X} inflated to {} bytes, expected {}",
                    host_offset,
                    data.len(),
                    cluster_size
                )));
            }
            self.cluster_cache = Some((entry, data));
        }

        Ok(self
            .cluster_cache
            .as_ref()
            .map(|(_, data)| data.as_slice())
            .unwrap_or(&[]))
    }

    /// Fill `out` from a single guest cluster starting at `guest_offset`
    fn read_in_cluster(&mut self, guest_offset: u64, out: &mut [u8]) -> io::Result<()> {
        let guest_cluster = guest_offset >> self.cluster_bits;
        let in_cluster = guest_offset & (self.cluster_size() - 1);
        let entry = self.l2_entry(guest_cluster)?;

        if entry & L2_COMPRESSED != 0 {
            let start = in_cluster as usize;
            let data = self.compressed_cluster(entry)?;
            out.copy_from_slice(&data[start..start + out.len()]);
            return Ok(());
        }

        let host_cluster = entry & OFFSET_MASK;
        if host_cluster == 0 || (self.zero_flag && entry & L2_ZERO != 0) {
            out.fill(0);
            return Ok(());
        }

        let host_offset = host_cluster + in_cluster;
        self.check_host_range(host_offset, out.len() as u64, "qcow2 data cluster")?;
        self.base.seek(SeekFrom::Start(host_offset))?;
        self.base.read_exact(out)
    }
}

impl<R: Read + Seek> Read for Qcow2Pipeline<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.virtual_size {
            return Ok(0); // EOF
        }

        let remaining = self.virtual_size - self.position;
        let to_read = (buf.len() as u64).min(remaining) as usize;
        let mut total_read = 0;

        while total_read < to_read {
            let offset = self.position + total_read as u64;
            let in_cluster = offset & (self.cluster_size() - 1);
            let chunk_size =
                ((to_read - total_read) as u64).min(self.cluster_size() - in_cluster) as usize;

            self.read_in_cluster(offset, &mut buf[total_read..total_read + chunk_size])?;
            total_read += chunk_size;
        }

        self.position += total_read as u64;
        Ok(total_read)
    }
}

impl<R: Read + Seek> Seek for Qcow2Pipeline<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(offset) => self.virtual_size.checked_add_signed(offset),
            SeekFrom::Current(offset) => self.position.checked_add_signed(offset),
        };

        let new_pos = new_pos.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Seek before beginning of qcow2 image")
        })?;

        if new_pos > self.virtual_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Seek beyond end of qcow2 image",
            ));
        }

        self.position = new_pos;
        Ok(self.position)
    }
}
