//! Security validation constants and helpers
//!
//! Disk images handed to the inspector are untrusted. Every size, count and
//! offset read from one passes through these helpers before it is used to
//! allocate or to seek.

use crate::Error;
use std::path::{Path, PathBuf};

/// Smallest logical sector size we accept
pub const MIN_SECTOR_SIZE: u32 = 512;

/// Maximum sector size we'll accept (4KB - common for advanced format)
pub const MAX_SECTOR_SIZE: u32 = 4096;

/// Maximum allocation size for single buffer (256 MB)
pub const MAX_ALLOCATION_SIZE: usize = 256 * 1024 * 1024;

/// Maximum file size for memory mapping (16 GB - practical limit for most systems)
pub const MAX_MMAP_SIZE: u64 = 16 * 1024 * 1024 * 1024;

/// Validate that a size is within allocation limits
///
/// # Security
/// Prevents memory exhaustion from malicious disk images
pub fn validate_allocation_size(size: u64, limit: usize, context: &str) -> crate::Result<usize> {
    if size > limit as u64 {
        return Err(Error::out_of_bounds(format!(
            "{} size {} exceeds limit {}",
            context, size, limit
        )));
    }

    size.try_into()
        .map_err(|_| Error::out_of_bounds(format!("{} size exceeds platform limits", context)))
}

/// Safely multiply two u64 values with overflow checking
pub fn checked_multiply_u64(a: u64, b: u64, context: &str) -> crate::Result<u64> {
    a.checked_mul(b)
        .ok_or_else(|| Error::out_of_bounds(format!("{}: multiplication overflow", context)))
}

/// Safely add two u64 values with overflow checking
pub fn checked_add_u64(a: u64, b: u64, context: &str) -> crate::Result<u64> {
    a.checked_add(b)
        .ok_or_else(|| Error::out_of_bounds(format!("{}: addition overflow", context)))
}

/// Ensure `offset..offset + length` lies inside a container of `total` bytes
///
/// # Security
/// Every read of a declared structure is checked here first, so a truncated
/// or hostile image fails cleanly instead of reading past its end.
pub fn ensure_within(offset: u64, length: u64, total: u64, context: &str) -> crate::Result<()> {
    let end = checked_add_u64(offset, length, context)?;
    if end > total {
        return Err(Error::out_of_bounds(format!(
            "{}: range 0x{:X}..0x{:X} exceeds image size {}",
            context, offset, end, total
        )));
    }
    Ok(())
}

/// Validate sector size is reasonable
pub fn validate_sector_size(sector_size: u32) -> crate::Result<()> {
    if !(MIN_SECTOR_SIZE..=MAX_SECTOR_SIZE).contains(&sector_size) {
        return Err(Error::invalid_zone_table(format!(
            "Invalid sector size: {} (must be {}-{})",
            sector_size, MIN_SECTOR_SIZE, MAX_SECTOR_SIZE
        )));
    }

    // Sector size should be power of 2
    if !sector_size.is_power_of_two() {
        return Err(Error::invalid_zone_table(format!(
            "Sector size {} is not a power of 2",
            sector_size
        )));
    }

    Ok(())
}

/// Validate an image path before opening it
///
/// # Returns
/// Canonical absolute path of a regular file, error otherwise
pub fn validate_image_path(path: &Path) -> crate::Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(Error::not_found("Empty path"));
    }

    // Canonicalize to resolve symlinks
    let canonical = path.canonicalize().map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => {
            Error::permission_denied(format!("{}: {}", path.display(), e))
        }
        std::io::ErrorKind::NotFound => Error::not_found(format!("{}: {}", path.display(), e)),
        _ => Error::Io(e),
    })?;

    // Devices, pipes and directories are not disk image files
    if !canonical.is_file() {
        return Err(Error::invalid_vault(format!(
            "Path is not a regular file: {}",
            canonical.display()
        )));
    }

    Ok(canonical)
}
