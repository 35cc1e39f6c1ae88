//! # bootprobe pipeline
//!
//! Read-only stream wrappers used by the vaults:
//! - **MmapPipeline**: read-only memory-mapped file access
//! - **PartialPipeline**: bounded window into a subset of a stream
//!
//! ## Example
//!
//! ```rust,no_run
//! use bootprobe_pipeline::{MmapPipeline, PartialPipeline};
//! use std::fs::File;
//! use std::io::Read;
//!
//! let file = File::open("disk.vhd").unwrap();
//! let len = file.metadata().unwrap().len();
//! let mmap = MmapPipeline::from_file(&file).unwrap();
//!
//! // Everything except the 512-byte footer
//! let mut guest = PartialPipeline::new(mmap, 0, len - 512).unwrap();
//! let mut mbr = [0u8; 512];
//! guest.read_exact(&mut mbr).unwrap();
//! ```

pub mod mmap;
pub mod partial;

pub use mmap::MmapPipeline;
pub use partial::PartialPipeline;
