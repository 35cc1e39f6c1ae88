//! # bootprobe vaults
//!
//! Container format handlers exposing the guest-visible bytes of a disk image.
//!
//! - **RawVault**: plain sector images
//! - **Qcow2Vault**: QEMU copy-on-write images, versions 2 and 3
//! - **VhdVault**: Microsoft VHD (fixed and dynamic)
//!
//! ## Example
//!
//! ```rust,no_run
//! use bootprobe_core::Vault;
//! use bootprobe_vaults::{DiskImage, ImageConfig};
//!
//! let image = DiskImage::open("disk.qcow2", &ImageConfig::default()).unwrap();
//! println!("Type: {}", image.identify());
//! println!("Size: {} bytes", image.length());
//! ```

pub mod factory;
pub mod image;
pub mod qcow2;
pub mod raw;
pub mod vhd;

pub use factory::{detect_format, open_vault};
pub use image::{DiskImage, ImageConfig};
pub use qcow2::Qcow2Vault;
pub use raw::{RawVault, VaultConfig};
pub use vhd::VhdVault;
