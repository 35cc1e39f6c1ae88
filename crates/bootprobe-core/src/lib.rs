//! # bootprobe core
//!
//! Core traits, types, and error handling shared by the bootprobe crates.
//!
//! The workspace answers one question about a disk image: was it prepared to
//! boot via UEFI? The pieces are:
//! - **Vaults**: container formats (raw, qcow2, VHD) exposing guest-visible bytes
//! - **Zones**: partition tables (GPT, MBR) read from a vault
//! - **Verdict**: the boot mode derived from a partition table
//!
//! ## Example
//!
//! ```rust,no_run
//! use bootprobe_core::{PartitionTable, Result, Vault};
//!
//! fn describe(vault: &mut dyn Vault, table: &PartitionTable) -> Result<()> {
//!     println!("Vault type: {}", vault.identify());
//!     println!("Vault size: {} bytes", vault.length());
//!     for entry in table.entries() {
//!         println!("  {}", entry);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod security;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use error::{Error, ImageOpenError, InspectError, PartitionTableError, Result};
pub use security::*;
pub use traits::{ReadSeek, Vault};
pub use types::{
    BootModeVerdict, ImageFormat, PartitionEntry, PartitionTable, PartitionTypeId, Scheme,
};
