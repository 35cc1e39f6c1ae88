//! Read-only access to a disk image by path

use crate::factory::{detect_format, open_vault};
use crate::raw::VaultConfig;
use bootprobe_core::{
    validate_image_path, Error, ImageFormat, ImageOpenError, ReadSeek, Result, Vault,
};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// How an image should be opened
#[derive(Debug, Clone, Default)]
pub struct ImageConfig {
    /// Container format; detected from the file when `None`
    pub format: Option<ImageFormat>,
    pub vault: VaultConfig,
}

/// A disk image opened for read-only inspection
///
/// Exposes the guest-visible byte stream of the image whatever its container
/// format is.
pub struct DiskImage {
    path: PathBuf,
    vault: Box<dyn Vault>,
}

impl DiskImage {
    /// Open the image at `path`
    ///
    /// Every failure is reported as an [`ImageOpenError`] naming the path.
    pub fn open(
        path: impl AsRef<Path>,
        config: &ImageConfig,
    ) -> std::result::Result<Self, ImageOpenError> {
        let path = path.as_ref();
        Self::open_inner(path, config).map_err(|e| ImageOpenError::new(path, e))
    }

    fn open_inner(path: &Path, config: &ImageConfig) -> Result<Self> {
        let canonical = validate_image_path(path)?;
        let mut file = File::open(&canonical).map_err(|e| open_error(&canonical, e))?;

        let format = match config.format {
            Some(format) => format,
            None => detect_format(&mut file, &canonical)?,
        };
        tracing::debug!(path = %canonical.display(), %format, "Opening image");

        let vault = open_vault(file, format, &config.vault)?;
        if vault.length() == 0 {
            return Err(Error::invalid_vault("Image has a guest size of zero"));
        }

        Ok(Self {
            path: canonical,
            vault,
        })
    }

    /// Canonical path of the image
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Guest-visible size in bytes
    pub fn size(&self) -> u64 {
        self.vault.length()
    }
}

fn open_error(path: &Path, err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::NotFound => Error::not_found(path.display().to_string()),
        io::ErrorKind::PermissionDenied => Error::permission_denied(path.display().to_string()),
        _ => Error::Io(err),
    }
}

impl Vault for DiskImage {
    fn identify(&self) -> &str {
        self.vault.identify()
    }

    fn format(&self) -> ImageFormat {
        self.vault.format()
    }

    fn length(&self) -> u64 {
        self.vault.length()
    }

    fn content(&mut self) -> &mut dyn ReadSeek {
        self.vault.content()
    }
}

impl std::fmt::Debug for DiskImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskImage")
            .field("path", &self.path)
            .field("format", &self.vault.format())
            .field("length", &self.vault.length())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{SeekFrom, Write};
    use tempfile::{Builder, NamedTempFile};

    fn write_temp(suffix: &str, data: &[u8]) -> NamedTempFile {
        let mut temp = Builder::new().suffix(suffix).tempfile().unwrap();
        temp.write_all(data).unwrap();
        temp.flush().unwrap();
        temp
    }

    fn guest() -> Vec<u8> {
        let mut bytes: Vec<u8> = (0..16384u32).map(|i| (i % 251) as u8).collect();
        bytes[510] = 0x55;
        bytes[511] = 0xAA;
        bytes
    }

    fn read_all(image: &mut DiskImage) -> Vec<u8> {
        let mut out = Vec::new();
        let stream = image.content();
        stream.seek(SeekFrom::Start(0)).unwrap();
        stream.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_open_raw() {
        let temp = write_temp(".img", &guest());
        let mut image = DiskImage::open(temp.path(), &ImageConfig::default()).unwrap();
        assert_eq!(image.format(), ImageFormat::Raw);
        assert_eq!(image.size(), 16384);
        assert_eq!(read_all(&mut image), guest());
    }

    #[test]
    fn test_formats_expose_same_guest_bytes() {
        let qcow = write_temp(".qcow2", &crate::qcow2::tests::qcow2_image(&guest(), false));
        let vhd = write_temp(".vhd", &crate::vhd::tests::fixed_vhd(&guest()));
        let dynamic = write_temp(".vhd", &crate::vhd::tests::dynamic_vhd(&guest()));

        for temp in [&qcow, &vhd, &dynamic] {
            let mut image = DiskImage::open(temp.path(), &ImageConfig::default()).unwrap();
            assert_eq!(image.size(), 16384);
            assert_eq!(read_all(&mut image), guest());
        }
    }

    #[test]
    fn test_forced_format() {
        let temp = write_temp(".bin", &crate::qcow2::tests::qcow2_image(&guest(), false));
        let config = ImageConfig {
            format: Some(ImageFormat::Raw),
            ..Default::default()
        };
        let image = DiskImage::open(temp.path(), &config).unwrap();
        assert_eq!(image.format(), ImageFormat::Raw);
        assert_ne!(image.size(), 16384);
    }

    #[test]
    fn test_open_missing_path() {
        let err = DiskImage::open("/nonexistent/disk.img", &ImageConfig::default()).unwrap_err();
        assert!(matches!(err.cause(), Error::NotFound(_)));
        assert!(err.is_retryable());
        assert_eq!(err.path(), Path::new("/nonexistent/disk.img"));
    }

    #[test]
    fn test_open_directory_and_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DiskImage::open(dir.path(), &ImageConfig::default()).unwrap_err();
        assert!(matches!(err.cause(), Error::InvalidVault(_)));
        assert!(!err.is_retryable());

        let empty = write_temp(".img", &[]);
        let err = DiskImage::open(empty.path(), &ImageConfig::default()).unwrap_err();
        assert!(matches!(err.cause(), Error::InvalidVault(_)));
    }

    #[test]
    fn test_open_text_file_is_not_an_image() {
        let text = b"not a disk image at all\n".repeat(512);
        let temp = write_temp(".img", &text);
        let err = DiskImage::open(temp.path(), &ImageConfig::default()).unwrap_err();
        assert!(matches!(err.cause(), Error::InvalidVault(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_open_corrupt_container() {
        let mut bytes = crate::qcow2::tests::qcow2_image(&guest(), false);
        bytes[4..8].copy_from_slice(&7u32.to_be_bytes());
        let temp = write_temp(".qcow2", &bytes);
        let err = DiskImage::open(temp.path(), &ImageConfig::default()).unwrap_err();
        assert!(matches!(err.cause(), Error::Unsupported(_)));
    }
}
