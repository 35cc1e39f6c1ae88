//! One inspection pass: open the image, read its partition table, classify it

use bootprobe_core::{BootModeVerdict, InspectError, Vault};
use bootprobe_vaults::{DiskImage, ImageConfig};
use bootprobe_zones::{classify, read_partition_table, ReadOptions};
use std::path::Path;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    OpenImage,
    ReadPartitionTable,
    Classify,
    Report,
}

impl Stage {
    pub const COUNT: usize = 4;

    pub fn number(self) -> usize {
        self as usize + 1
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::OpenImage => "open-image",
            Stage::ReadPartitionTable => "read-partition-table",
            Stage::Classify => "classify",
            Stage::Report => "report",
        }
    }
}

/// Trace entry into a stage on the diagnostic stream
pub fn enter(stage: Stage) {
    tracing::info!(
        "stage {}/{}: {}",
        stage.number(),
        Stage::COUNT,
        stage.name()
    );
}

/// Run the inspection stages up to a verdict
///
/// The image is closed when this returns, whatever the outcome.
pub fn inspect(
    path: &Path,
    image_config: &ImageConfig,
    read_options: &ReadOptions,
) -> Result<BootModeVerdict, InspectError> {
    enter(Stage::OpenImage);
    let mut image = DiskImage::open(path, image_config)?;
    tracing::info!(
        path = %image.path().display(),
        format = %image.format(),
        container = image.identify(),
        size = image.size(),
        "Opened image"
    );

    enter(Stage::ReadPartitionTable);
    let table = read_partition_table(&mut image, read_options)?;
    tracing::info!(
        scheme = %table.scheme(),
        sector_size = table.sector_size(),
        partitions = table.entries().len(),
        "Read partition table"
    );
    for entry in table.entries() {
        tracing::debug!("{}", entry);
    }

    enter(Stage::Classify);
    let verdict = classify(&table);
    tracing::info!(%verdict, "Classified image");
    Ok(verdict)
}
