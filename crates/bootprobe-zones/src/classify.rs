//! Boot-mode classification

use crate::gpt::types::PartitionTypeGuid;
use crate::mbr::types::MbrPartitionType;
use bootprobe_core::{BootModeVerdict, PartitionTable, PartitionTypeId};

/// Human-readable name of a partition type
pub fn type_name(type_id: &PartitionTypeId) -> &'static str {
    match type_id {
        PartitionTypeId::Gpt(guid) => PartitionTypeGuid::from_uuid(guid).name(),
        PartitionTypeId::Mbr(code) => MbrPartitionType(*code).name(),
    }
}

/// Whether a partition type marks an EFI System Partition
///
/// Only the GPT type GUID counts. MBR type 0xEF is not accepted.
pub fn is_esp(type_id: &PartitionTypeId) -> bool {
    match type_id {
        PartitionTypeId::Gpt(guid) => {
            PartitionTypeGuid::from_uuid(guid) == PartitionTypeGuid::EFI_SYSTEM
        }
        PartitionTypeId::Mbr(_) => false,
    }
}

/// Decide whether a partition table describes a UEFI-bootable disk
///
/// Entries are scanned in table order and each one is logged; the scan stops
/// at the first EFI System Partition.
pub fn classify(table: &PartitionTable) -> BootModeVerdict {
    tracing::info!(
        scheme = %table.scheme(),
        partitions = table.entries().len(),
        "Classifying partition table"
    );

    for entry in table.entries() {
        let type_id = entry.type_id();
        tracing::info!(
            partition = entry.index(),
            guid = %type_id,
            kind = type_name(&type_id),
            "Scanned partition"
        );

        if is_esp(&type_id) {
            return BootModeVerdict::UefiPresent;
        }
        if type_id == PartitionTypeId::Mbr(MbrPartitionType::EFI_SYSTEM.0) {
            tracing::warn!(
                partition = entry.index(),
                "MBR partition of type 0xEF is not treated as an EFI System Partition"
            );
        }
    }

    BootModeVerdict::UefiAbsent
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootprobe_core::{PartitionEntry, Scheme};

    fn gpt_entry(index: u32, guid: PartitionTypeGuid) -> PartitionEntry {
        PartitionEntry::new(index, PartitionTypeId::Gpt(guid.to_uuid()), 2048, 1 << 20)
    }

    #[test]
    fn test_esp_present() {
        let table = PartitionTable::new(
            Scheme::Gpt,
            512,
            vec![
                gpt_entry(1, PartitionTypeGuid::BIOS_BOOT),
                gpt_entry(2, PartitionTypeGuid::EFI_SYSTEM),
                gpt_entry(3, PartitionTypeGuid::LINUX_FILESYSTEM),
            ],
        );
        assert_eq!(classify(&table), BootModeVerdict::UefiPresent);
    }

    #[test]
    fn test_esp_absent() {
        let table = PartitionTable::new(
            Scheme::Gpt,
            512,
            vec![
                gpt_entry(1, PartitionTypeGuid::BIOS_BOOT),
                gpt_entry(2, PartitionTypeGuid::LINUX_FILESYSTEM),
            ],
        );
        assert_eq!(classify(&table), BootModeVerdict::UefiAbsent);
    }

    #[test]
    fn test_empty_table() {
        let table = PartitionTable::new(Scheme::Gpt, 512, Vec::new());
        assert_eq!(classify(&table), BootModeVerdict::UefiAbsent);
    }

    #[test]
    fn test_mbr_is_never_uefi() {
        let table = PartitionTable::new(
            Scheme::Mbr,
            512,
            vec![
                PartitionEntry::new(1, PartitionTypeId::Mbr(0xEF), 2048, 1 << 20),
                PartitionEntry::new(2, PartitionTypeId::Mbr(0x83), 4096, 1 << 20),
            ],
        );
        assert_eq!(classify(&table), BootModeVerdict::UefiAbsent);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(
            type_name(&PartitionTypeId::Gpt(PartitionTypeGuid::EFI_SYSTEM.to_uuid())),
            "EFI System"
        );
        assert_eq!(type_name(&PartitionTypeId::Mbr(0x83)), "Linux");
    }
}
