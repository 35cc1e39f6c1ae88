//! Container format detection
//!
//! Detection is driven by magic bytes. Containers that are recognized but not
//! supported are rejected here so they are never misread as raw sector
//! images.

use crate::{Qcow2Vault, RawVault, VaultConfig, VhdVault};
use bootprobe_core::{Error, ImageFormat, Result, Vault};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Smallest file accepted as a disk image: one 512-byte sector
pub const MIN_IMAGE_SIZE: u64 = 512;

/// Magic bytes for various formats
const QCOW2_MAGIC: &[u8] = b"QFI\xfb";
const VHD_MAGIC: &[u8] = b"conectix";
const VHDX_MAGIC: &[u8] = b"vhdxfile";
const VMDK_SPARSE_MAGIC: &[u8] = b"KDMV";
const VMDK_DESCRIPTOR_MAGIC: &[u8] = b"# Disk DescriptorFile";
const VDI_BANNER: &[u8] = b"<<< ";
const VDI_SIGNATURE_OFFSET: usize = 0x40;
const VDI_SIGNATURE: u32 = 0xBEDA_107F;
const GPT_SIGNATURE: &[u8] = b"EFI PART";
const GPT_HEADER_OFFSETS: [u64; 2] = [512, 4096];

/// Reject files that cannot hold a partition table at all
pub fn check_minimum_size(len: u64) -> Result<()> {
    if len == 0 {
        return Err(Error::invalid_vault("Empty file is not a disk image"));
    }
    if len < MIN_IMAGE_SIZE {
        return Err(Error::invalid_vault(format!(
            "File of {} bytes is smaller than one sector",
            len
        )));
    }
    Ok(())
}

/// Identify containers we recognize but cannot read
fn unsupported_container(head: &[u8]) -> Option<&'static str> {
    if head.starts_with(VHDX_MAGIC) {
        return Some("VHDX");
    }
    if head.starts_with(VMDK_SPARSE_MAGIC) || head.starts_with(VMDK_DESCRIPTOR_MAGIC) {
        return Some("VMDK");
    }
    if head.starts_with(VDI_BANNER) {
        return Some("VirtualBox VDI");
    }
    if head.len() >= VDI_SIGNATURE_OFFSET + 4 {
        let at = VDI_SIGNATURE_OFFSET;
        let signature = u32::from_le_bytes([head[at], head[at + 1], head[at + 2], head[at + 3]]);
        if signature == VDI_SIGNATURE {
            return Some("VirtualBox VDI");
        }
    }
    None
}

/// Whether a headerless file carries a partition table signature
///
/// Either the 0x55AA boot signature of LBA 0, or a GPT header at LBA 1 for
/// 512 or 4096-byte sectors.
fn has_partition_signature(file: &mut File, len: u64, head: &[u8]) -> Result<bool> {
    if head.len() >= 512 && head[510] == 0x55 && head[511] == 0xAA {
        return Ok(true);
    }
    for offset in GPT_HEADER_OFFSETS {
        if offset + GPT_SIGNATURE.len() as u64 > len {
            break;
        }
        let mut signature = [0u8; 8];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut signature)?;
        if signature == GPT_SIGNATURE {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Detect the container format of an opened image file
///
/// The file extension is only used to refuse files that claim to be a
/// container but lack its header. A file without any container header is
/// only taken as raw when it carries a partition table signature.
pub fn detect_format(file: &mut File, path: &Path) -> Result<ImageFormat> {
    let len = file.metadata()?.len();
    check_minimum_size(len)?;

    let mut head = Vec::with_capacity(512);
    file.seek(SeekFrom::Start(0))?;
    file.by_ref().take(512).read_to_end(&mut head)?;

    if head.starts_with(QCOW2_MAGIC) {
        return Ok(ImageFormat::Qcow2);
    }

    // Dynamic VHDs carry a footer copy at offset 0
    if head.starts_with(VHD_MAGIC) {
        return Ok(ImageFormat::Vhd);
    }

    if let Some(name) = unsupported_container(&head) {
        return Err(Error::unsupported(format!("{} images", name)));
    }

    if len >= 2 * MIN_IMAGE_SIZE {
        file.seek(SeekFrom::End(-512))?;
        let mut footer = [0u8; 8];
        file.read_exact(&mut footer)?;
        if footer == VHD_MAGIC {
            return Ok(ImageFormat::Vhd);
        }
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "qcow2" | "qcow" | "vhd" => Err(Error::invalid_vault(format!(
            "File extension names a {} container but its header is missing",
            extension
        ))),
        "vhdx" | "vmdk" | "vdi" => Err(Error::unsupported(format!(
            "Unrecognized {} container",
            extension
        ))),
        _ if has_partition_signature(file, len, &head)? => Ok(ImageFormat::Raw),
        _ => Err(Error::invalid_vault(
            "No container header or partition table signature, not a disk image",
        )),
    }
}

/// Open a vault of a known format over an opened file
pub fn open_vault(file: File, format: ImageFormat, config: &VaultConfig) -> Result<Box<dyn Vault>> {
    match format {
        ImageFormat::Raw => {
            check_minimum_size(file.metadata()?.len())?;
            Ok(Box::new(RawVault::open(file, config)?))
        }
        ImageFormat::Qcow2 => Ok(Box::new(Qcow2Vault::open(file, config)?)),
        ImageFormat::Vhd => Ok(Box::new(VhdVault::open(file, config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn detect(suffix: &str, data: &[u8]) -> Result<ImageFormat> {
        let mut temp = Builder::new().suffix(suffix).tempfile().unwrap();
        temp.write_all(data).unwrap();
        temp.flush().unwrap();
        let mut file = File::open(temp.path()).unwrap();
        detect_format(&mut file, temp.path())
    }

    fn boot_sector(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        data[510] = 0x55;
        data[511] = 0xAA;
        data
    }

    #[test]
    fn test_detect_raw() {
        assert_eq!(detect(".img", &boot_sector(1024)).unwrap(), ImageFormat::Raw);
        assert_eq!(detect("", &boot_sector(512)).unwrap(), ImageFormat::Raw);

        let mut gpt = vec![0u8; 1024];
        gpt[512..520].copy_from_slice(GPT_SIGNATURE);
        assert_eq!(detect(".img", &gpt).unwrap(), ImageFormat::Raw);
    }

    #[test]
    fn test_detect_empty_and_tiny_files() {
        assert!(matches!(detect(".img", &[]), Err(Error::InvalidVault(_))));
        assert!(matches!(detect(".img", b"hello"), Err(Error::InvalidVault(_))));
    }

    #[test]
    fn test_detect_qcow2_by_magic() {
        let mut data = vec![0u8; 1024];
        data[..4].copy_from_slice(QCOW2_MAGIC);
        assert_eq!(detect(".dat", &data).unwrap(), ImageFormat::Qcow2);
    }

    #[test]
    fn test_detect_vhd_by_magic() {
        let mut head = vec![0u8; 1024];
        head[..8].copy_from_slice(VHD_MAGIC);
        assert_eq!(detect(".dat", &head).unwrap(), ImageFormat::Vhd);

        let mut tail = vec![0u8; 2048];
        tail[1536..1544].copy_from_slice(VHD_MAGIC);
        assert_eq!(detect(".dat", &tail).unwrap(), ImageFormat::Vhd);
    }

    #[test]
    fn test_detect_unsupported_containers() {
        let mut vmdk = vec![0u8; 1024];
        vmdk[..4].copy_from_slice(VMDK_SPARSE_MAGIC);
        assert!(matches!(detect(".img", &vmdk), Err(Error::Unsupported(_))));

        let mut vhdx = vec![0u8; 1024];
        vhdx[..8].copy_from_slice(VHDX_MAGIC);
        assert!(matches!(detect(".img", &vhdx), Err(Error::Unsupported(_))));

        let mut vdi = vec![0u8; 1024];
        vdi[0x40..0x44].copy_from_slice(&VDI_SIGNATURE.to_le_bytes());
        assert!(matches!(detect(".img", &vdi), Err(Error::Unsupported(_))));

        let mut banner = b"<<< Oracle VM VirtualBox Disk Image >>>\n".to_vec();
        banner.resize(1024, 0);
        assert!(matches!(detect(".img", &banner), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_container_extension_without_magic() {
        assert!(matches!(
            detect(".qcow2", &[0u8; 1024]),
            Err(Error::InvalidVault(_))
        ));
        assert!(matches!(detect(".vmdk", &[0u8; 1024]), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_raw_needs_partition_signature() {
        let mut text = b"meeting notes, not a disk\n".repeat(400);
        text.truncate(8192);
        assert!(matches!(detect(".img", &text), Err(Error::InvalidVault(_))));
        assert!(matches!(detect(".img", &[0u8; 4096]), Err(Error::InvalidVault(_))));

        let mut gpt_4k = vec![0u8; 8192];
        gpt_4k[4096..4104].copy_from_slice(GPT_SIGNATURE);
        assert_eq!(detect(".img", &gpt_4k).unwrap(), ImageFormat::Raw);

        // Signature cut off by the end of the file
        let mut short = vec![0u8; 516];
        short[512..516].copy_from_slice(&GPT_SIGNATURE[..4]);
        assert!(detect(".img", &short).is_err());
    }
}
