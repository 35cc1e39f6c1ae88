//! # bootprobe zones
//!
//! Partition table handling for bootprobe.
//!
//! - **GPT**: GUID Partition Table, validated strictly (header and entry CRC32)
//! - **MBR**: the four primary records of a legacy Master Boot Record
//!
//! [`read_partition_table`] picks the scheme and [`classify`] turns the table
//! into a boot-mode verdict.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bootprobe_vaults::{DiskImage, ImageConfig};
//! use bootprobe_zones::{classify, read_partition_table, ReadOptions};
//!
//! let mut image = DiskImage::open("disk.img", &ImageConfig::default()).unwrap();
//! let table = read_partition_table(&mut image, &ReadOptions::default()).unwrap();
//! println!("Verdict: {}", classify(&table));
//! ```

pub mod classify;
pub mod gpt;
pub mod mbr;
pub mod reader;

pub use classify::{classify, is_esp, type_name};
pub use gpt::GptTable;
pub use mbr::MbrTable;
pub use reader::{read_partition_table, ReadOptions, SectorSize};
