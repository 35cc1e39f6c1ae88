//! Command-line arguments

use bootprobe_core::ImageFormat;
use bootprobe_vaults::{ImageConfig, VaultConfig};
use bootprobe_zones::{ReadOptions, SectorSize};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bootprobe")]
#[command(about = "Report whether a disk image carries an EFI System Partition")]
#[command(version)]
pub struct Cli {
    /// Disk image to inspect (raw, qcow2 or VHD)
    pub image: Option<PathBuf>,

    /// Container format of the image
    #[arg(long, value_enum, default_value_t = FormatArg::Auto)]
    pub format: FormatArg,

    /// Logical sector size: auto, 512 or 4096
    #[arg(long, default_value = "auto", value_parser = parse_sector_size)]
    pub sector_size: SectorSize,

    /// Read the image with plain file I/O instead of a memory map
    #[arg(long)]
    pub no_mmap: bool,

    /// Log level
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    /// Detect from magic bytes
    Auto,
    Raw,
    Qcow2,
    Vhd,
}

impl FormatArg {
    fn format(self) -> Option<ImageFormat> {
        match self {
            FormatArg::Auto => None,
            FormatArg::Raw => Some(ImageFormat::Raw),
            FormatArg::Qcow2 => Some(ImageFormat::Qcow2),
            FormatArg::Vhd => Some(ImageFormat::Vhd),
        }
    }
}

fn parse_sector_size(value: &str) -> Result<SectorSize, String> {
    match value {
        "auto" => Ok(SectorSize::Probe),
        "512" => Ok(SectorSize::Fixed(512)),
        "4096" => Ok(SectorSize::Fixed(4096)),
        other => Err(format!("expected auto, 512 or 4096, got '{}'", other)),
    }
}

impl Cli {
    pub fn image_config(&self) -> ImageConfig {
        ImageConfig {
            format: self.format.format(),
            vault: VaultConfig {
                use_mmap: !self.no_mmap,
            },
        }
    }

    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            sector_size: self.sector_size,
        }
    }
}
