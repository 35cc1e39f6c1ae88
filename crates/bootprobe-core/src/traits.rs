//! Core traits for image access

use crate::types::ImageFormat;
use std::io::{Read, Seek};

/// Trait for disk image vaults (containers)
///
/// A vault hides the container encoding and exposes the bytes the guest would
/// see on its disk. Vaults are read-only.
pub trait Vault: Send {
    /// Get a human-readable identifier for this vault type
    fn identify(&self) -> &str;

    /// Container format of this vault
    fn format(&self) -> ImageFormat;

    /// Get the guest-visible size of the vault in bytes
    fn length(&self) -> u64;

    /// Get a readable and seekable stream to the vault content
    fn content(&mut self) -> &mut dyn ReadSeek;
}

/// Combined trait for Read + Seek
pub trait ReadSeek: Read + Seek + Send {}

/// Blanket implementation for any type that implements Read + Seek
impl<T: Read + Seek + Send> ReadSeek for T {}
