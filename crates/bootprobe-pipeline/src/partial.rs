//! Partial pipeline - provides a bounded window into a subset of a stream

use std::io::{self, Read, Seek, SeekFrom};

/// A pipeline that exposes only a portion of an underlying stream.
///
/// Used to present the guest area of a container (for example a fixed VHD
/// without its footer) as an independent stream. Reads never cross the end of
/// the window.
pub struct PartialPipeline<R: Read + Seek> {
    inner: R,
    start: u64,
    length: u64,
    position: u64,
}

impl<R: Read + Seek> PartialPipeline<R> {
    /// Create a new partial pipeline
    ///
    /// # Errors
    ///
    /// Returns an error if the window does not fit inside the underlying
    /// stream.
    pub fn new(mut inner: R, start: u64, length: u64) -> io::Result<Self> {
        let inner_len = inner.seek(SeekFrom::End(0))?;
        let end = start.checked_add(length).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Partial window overflows")
        })?;

        if end > inner_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Partial window 0x{:X}..0x{:X} exceeds stream length {}",
                    start, end, inner_len
                ),
            ));
        }

        inner.seek(SeekFrom::Start(start))?;

        Ok(Self {
            inner,
            start,
            length,
            position: 0,
        })
    }

    /// Get the length of this partial pipeline
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Get the current position within this partial pipeline
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Get the remaining bytes from current position to end
    pub fn remaining(&self) -> u64 {
        self.length.saturating_sub(self.position)
    }
}

impl<R: Read + Seek> Read for PartialPipeline<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(0); // EOF
        }

        let to_read = (buf.len() as u64).min(remaining) as usize;

        self.inner.seek(SeekFrom::Start(self.start + self.position))?;
        let bytes_read = self.inner.read(&mut buf[..to_read])?;

        self.position += bytes_read as u64;
        Ok(bytes_read)
    }
}

impl<R: Read + Seek> Seek for PartialPipeline<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(offset) => self.length.checked_add_signed(offset),
            SeekFrom::Current(offset) => self.position.checked_add_signed(offset),
        };

        let new_pos = new_pos.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "Seek before beginning of partial pipeline",
            )
        })?;

        if new_pos > self.length {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Seek beyond end of partial pipeline",
            ));
        }

        self.position = new_pos;
        Ok(self.position)
    }
}
