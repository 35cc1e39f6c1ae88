//! VHD (Virtual Hard Disk) vault implementation
//!
//! ## Supported Formats
//!
//! - **Fixed VHD**: data stored contiguously, 512-byte footer at the end
//! - **Dynamic VHD**: sparse blocks located through a Block Allocation Table
//!
//! Differencing disks are rejected: their parent image is not available to a
//! single-file inspector.

pub mod types;

use bootprobe_core::{
    checked_multiply_u64, ensure_within, validate_allocation_size, Error, ImageFormat, ReadSeek,
    Result, Vault, MAX_ALLOCATION_SIZE,
};
use bootprobe_pipeline::PartialPipeline;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use types::{BlockAllocationTable, VhdDynamicHeader, VhdFooter, VhdType};

use crate::raw::{file_stream, VaultConfig};

/// VHD vault - Microsoft Virtual Hard Disk container
pub struct VhdVault {
    pipeline: Box<dyn ReadSeek>,
    footer: VhdFooter,
}

impl VhdVault {
    /// Open a VHD vault over an already opened file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The footer is missing, corrupted or has a bad checksum
    /// - The dynamic header or BAT is invalid or lies outside the file
    /// - The disk is a differencing disk
    pub fn open(file: File, config: &VaultConfig) -> Result<Self> {
        let mut stream = file_stream(file, config)?;
        let file_len = stream.seek(SeekFrom::End(0))?;

        if file_len < VhdFooter::SIZE as u64 {
            return Err(Error::invalid_vault("File too small to be a VHD"));
        }

        stream.seek(SeekFrom::End(-(VhdFooter::SIZE as i64)))?;
        let mut footer_bytes = [0u8; VhdFooter::SIZE];
        stream.read_exact(&mut footer_bytes)?;
        let footer = VhdFooter::parse(&footer_bytes)?;

        tracing::debug!(
            disk_type = ?footer.disk_type,
            current_size = footer.current_size,
            "parsed VHD footer"
        );

        let pipeline: Box<dyn ReadSeek> = match footer.disk_type {
            VhdType::Fixed => {
                let data_len = file_len - VhdFooter::SIZE as u64;
                if footer.current_size > data_len {
                    return Err(Error::out_of_bounds(format!(
                        "Fixed VHD declares {} bytes but holds only {}",
                        footer.current_size, data_len
                    )));
                }
                Box::new(PartialPipeline::new(stream, 0, footer.current_size)?)
            }
            VhdType::Dynamic => {
                let (header, bat) = Self::read_dynamic_metadata(&mut *stream, &footer, file_len)?;
                let capacity = checked_multiply_u64(
                    header.max_table_entries as u64,
                    header.block_size as u64,
                    "VHD block capacity",
                )?;
                if footer.current_size > capacity {
                    return Err(Error::invalid_vault(format!(
                        "Dynamic VHD size {} exceeds BAT capacity {}",
                        footer.current_size, capacity
                    )));
                }
                Box::new(VhdDynamicPipeline {
                    base: stream,
                    bat,
                    bitmap_size: header.bitmap_size(),
                    virtual_size: footer.current_size,
                    position: 0,
                })
            }
            VhdType::Differencing => {
                return Err(Error::unsupported(
                    "Differencing VHD requires its parent image",
                ))
            }
        };

        Ok(Self { pipeline, footer })
    }

    fn read_dynamic_metadata(
        stream: &mut dyn ReadSeek,
        footer: &VhdFooter,
        file_len: u64,
    ) -> Result<(VhdDynamicHeader, BlockAllocationTable)> {
        ensure_within(
            footer.data_offset,
            VhdDynamicHeader::SIZE as u64,
            file_len,
            "VHD dynamic header",
        )?;

        stream.seek(SeekFrom::Start(footer.data_offset))?;
        let mut header_bytes = [0u8; VhdDynamicHeader::SIZE];
        stream.read_exact(&mut header_bytes)?;
        let header = VhdDynamicHeader::parse(&header_bytes)?;

        let bat_len = checked_multiply_u64(header.max_table_entries as u64, 4, "VHD BAT")?;
        ensure_within(header.table_offset, bat_len, file_len, "VHD BAT")?;
        let bat_len = validate_allocation_size(bat_len, MAX_ALLOCATION_SIZE, "VHD BAT")?;

        stream.seek(SeekFrom::Start(header.table_offset))?;
        let mut bat_bytes = vec![0u8; bat_len];
        stream.read_exact(&mut bat_bytes)?;

        let bat = BlockAllocationTable::parse(&bat_bytes, header.block_size)?;
        Ok((header, bat))
    }

    /// Get the VHD footer
    pub fn footer(&self) -> &VhdFooter {
        &self.footer
    }

    /// Check if this is a dynamic VHD
    pub fn is_dynamic(&self) -> bool {
        self.footer.disk_type == VhdType::Dynamic
    }
}

impl Vault for VhdVault {
    fn identify(&self) -> &str {
        match self.footer.disk_type {
            VhdType::Fixed => "Microsoft VHD (Fixed)",
            VhdType::Dynamic => "Microsoft VHD (Dynamic)",
            VhdType::Differencing => "Microsoft VHD (Differencing)",
        }
    }

    fn format(&self) -> ImageFormat {
        ImageFormat::Vhd
    }

    fn length(&self) -> u64 {
        self.footer.current_size
    }

    fn content(&mut self) -> &mut dyn ReadSeek {
        &mut *self.pipeline
    }
}

/// Translates guest offsets to file offsets through the BAT
struct VhdDynamicPipeline<R: Read + Seek> {
    base: R,
    bat: BlockAllocationTable,
    bitmap_size: u64,
    virtual_size: u64,
    position: u64,
}

impl<R: Read + Seek> Read for VhdDynamicPipeline<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.virtual_size {
            return Ok(0); // EOF
        }

        let remaining = self.virtual_size - self.position;
        let to_read = (buf.len() as u64).min(remaining) as usize;
        let mut total_read = 0;

        while total_read < to_read {
            let current_offset = self.position + total_read as u64;
            let block_index = self.bat.offset_to_block(current_offset);
            let block_offset = self.bat.offset_within_block(current_offset);

            let remaining_in_block = self.bat.block_size as u64 - block_offset;
            let chunk_size = ((to_read - total_read) as u64).min(remaining_in_block) as usize;
            let chunk = &mut buf[total_read..total_read + chunk_size];

            match self.bat.get_block_offset(block_index) {
                Some(physical_offset) => {
                    let physical_pos = physical_offset + self.bitmap_size + block_offset;
                    self.base.seek(SeekFrom::Start(physical_pos))?;
                    self.base.read_exact(chunk).map_err(|e| {
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("VHD block {} points outside the file: {}", block_index, e),
                        )
                    })?;
                }
                // Sparse block
                None => chunk.fill(0),
            }

            total_read += chunk_size;
        }

        self.position += total_read as u64;
        Ok(total_read)
    }
}

impl<R: Read + Seek> Seek for VhdDynamicPipeline<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(offset) => self.virtual_size.checked_add_signed(offset),
            SeekFrom::Current(offset) => self.position.checked_add_signed(offset),
        };

        let new_pos = new_pos.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Seek before beginning of VHD")
        })?;

        if new_pos > self.virtual_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Seek beyond end of VHD",
            ));
        }

        self.position = new_pos;
        Ok(self.position)
    }
}
