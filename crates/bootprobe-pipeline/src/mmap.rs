//! Read-only memory-mapped pipeline

use bootprobe_core::MAX_MMAP_SIZE;
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

/// A pipeline backed by a read-only memory map of an image file.
///
/// The map is created with [`Mmap`], never `MmapMut`, so the image cannot be
/// written through it.
pub struct MmapPipeline {
    mmap: Mmap,
    position: u64,
}

impl MmapPipeline {
    /// Whether a file of `len` bytes can be mapped
    ///
    /// Empty files cannot be mapped on every platform, and very large ones
    /// would exhaust address space on 32-bit hosts.
    pub fn is_mappable(len: u64) -> bool {
        len > 0 && len <= MAX_MMAP_SIZE && usize::try_from(len).is_ok()
    }

    /// Map an already opened file
    ///
    /// # Errors
    ///
    /// Returns an error if the file is not a regular file, is empty, exceeds
    /// the mapping limit, or the OS refuses the mapping.
    ///
    /// # Safety
    ///
    /// Uses `unsafe` for memory mapping because the OS cannot stop another
    /// process from truncating the file while it is mapped. The inspector
    /// never writes, and images are not expected to change during a single
    /// inspection pass.
    pub fn from_file(file: &File) -> io::Result<Self> {
        let metadata = file.metadata()?;

        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Only regular files can be memory-mapped",
            ));
        }

        if !Self::is_mappable(metadata.len()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "File size {} is outside the memory mapping range (1..={})",
                    metadata.len(),
                    MAX_MMAP_SIZE
                ),
            ));
        }

        // SAFETY: file is a regular, non-empty file opened read-only; the map
        // is read-only and lives no longer than this pipeline.
        let mmap = unsafe { Mmap::map(file)? };

        Ok(Self { mmap, position: 0 })
    }

    /// Get the length of the mapped region
    pub fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Check if the mapped region is empty
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Get the current position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Get remaining bytes from current position
    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.position)
    }
}

impl Read for MmapPipeline {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining() as usize;
        if remaining == 0 {
            return Ok(0); // EOF
        }

        let to_read = buf.len().min(remaining);
        let start = self.position as usize;
        let end = start + to_read;

        buf[..to_read].copy_from_slice(&self.mmap[start..end]);
        self.position += to_read as u64;

        Ok(to_read)
    }
}

impl Seek for MmapPipeline {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(offset) => self.len().checked_add_signed(offset),
            SeekFrom::Current(offset) => self.position.checked_add_signed(offset),
        };

        // Seeking past EOF is allowed (reads there return 0), before 0 is not
        let new_pos = new_pos.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Seek before beginning of file")
        })?;

        self.position = new_pos;
        Ok(self.position)
    }
}
