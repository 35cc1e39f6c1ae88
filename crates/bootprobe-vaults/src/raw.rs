//! Raw vault - direct sector image container
//!
//! A raw image has no container metadata: guest byte N is file byte N.
//! Common file extensions: .img, .raw, .dd, .bin

use bootprobe_core::{ImageFormat, ReadSeek, Result, Vault};
use bootprobe_pipeline::MmapPipeline;
use std::fs::File;

/// Configuration for opening a vault
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Read through a read-only memory map when the file allows it
    pub use_mmap: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self { use_mmap: true }
    }
}

/// Wrap an opened image file in the stream the vaults read from
///
/// Falls back to plain file reads when mapping is disabled or the file is
/// outside the mappable range.
pub(crate) fn file_stream(file: File, config: &VaultConfig) -> Result<Box<dyn ReadSeek>> {
    let len = file.metadata()?.len();

    if config.use_mmap && MmapPipeline::is_mappable(len) {
        return Ok(Box::new(MmapPipeline::from_file(&file)?));
    }

    if config.use_mmap {
        tracing::debug!(len, "image outside mmap range, using buffered reads");
    }
    Ok(Box::new(file))
}

/// Raw vault - a simple passthrough to the underlying file
///
/// # Example
///
/// ```rust,no_run
/// use bootprobe_vaults::{RawVault, VaultConfig};
/// use bootprobe_core::Vault;
/// use std::fs::File;
///
/// let file = File::open("disk.img").unwrap();
/// let vault = RawVault::open(file, &VaultConfig::default()).unwrap();
/// println!("Size: {} bytes", vault.length());
/// ```
pub struct RawVault {
    pipeline: Box<dyn ReadSeek>,
    length: u64,
}

impl RawVault {
    /// Open a raw vault over an already opened file
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata cannot be read or mapping fails
    pub fn open(file: File, config: &VaultConfig) -> Result<Self> {
        let length = file.metadata()?.len();
        let pipeline = file_stream(file, config)?;

        Ok(Self { pipeline, length })
    }
}

impl Vault for RawVault {
    fn identify(&self) -> &str {
        "Raw sector image"
    }

    fn format(&self) -> ImageFormat {
        ImageFormat::Raw
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn content(&mut self) -> &mut dyn ReadSeek {
        &mut *self.pipeline
    }
}
