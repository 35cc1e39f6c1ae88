//! Maps an inspection outcome to the process protocol
//!
//! Exit codes: 0 ESP present, 1 usage error, 2 ESP absent, 3 inspection
//! failed. The status line is written to stdout for 0 and 2 only.

use crate::inspect::{enter, Stage};
use bootprobe_core::{BootModeVerdict, InspectError};
use std::io::{self, Write};
use std::process::ExitCode;

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Help or version output
    Success,
    UefiPresent,
    Usage,
    UefiAbsent,
    Failed,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Success | ExitStatus::UefiPresent => 0,
            ExitStatus::Usage => 1,
            ExitStatus::UefiAbsent => 2,
            ExitStatus::Failed => 3,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

/// Status line consumed by the import workflow
pub fn status_line(has_uefi_partition: bool) -> String {
    format!(
        "Status: <serial-output key:'has_uefi_partition' value:'{}'>",
        has_uefi_partition
    )
}

/// Emit the outcome of an inspection and return the exit status
///
/// A failed stage records the verdict as indeterminate and writes nothing to
/// `out`.
pub fn report(outcome: Result<BootModeVerdict, InspectError>, out: &mut dyn Write) -> ExitStatus {
    enter(Stage::Report);

    let verdict = match outcome {
        Ok(verdict) => verdict,
        Err(err) => {
            let stage = err.stage();
            let retryable = err.is_retryable();
            let err = anyhow::Error::new(err);
            tracing::error!(stage, retryable, "Inspection failed: {:#}", err);
            tracing::info!(verdict = %BootModeVerdict::Indeterminate, "Final determination");
            return ExitStatus::Failed;
        }
    };

    tracing::info!(%verdict, "Final determination");
    let status = match verdict {
        BootModeVerdict::UefiPresent => ExitStatus::UefiPresent,
        BootModeVerdict::UefiAbsent => ExitStatus::UefiAbsent,
        BootModeVerdict::Indeterminate => return ExitStatus::Failed,
    };

    if let Err(e) = write_status(out, verdict.has_uefi_partition()) {
        tracing::error!("Failed to write status line: {}", e);
        return ExitStatus::Failed;
    }
    status
}

fn write_status(out: &mut dyn Write, has_uefi_partition: bool) -> io::Result<()> {
    writeln!(out, "{}", status_line(has_uefi_partition))?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootprobe_core::{Error, ImageOpenError, PartitionTableError};

    #[test]
    fn test_status_line_format() {
        assert_eq!(
            status_line(true),
            "Status: <serial-output key:'has_uefi_partition' value:'true'>"
        );
        assert_eq!(
            status_line(false),
            "Status: <serial-output key:'has_uefi_partition' value:'false'>"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::UefiPresent.code(), 0);
        assert_eq!(ExitStatus::Usage.code(), 1);
        assert_eq!(ExitStatus::UefiAbsent.code(), 2);
        assert_eq!(ExitStatus::Failed.code(), 3);
    }

    #[test]
    fn test_report_verdicts() {
        let mut out = Vec::new();
        assert_eq!(report(Ok(BootModeVerdict::UefiPresent), &mut out), ExitStatus::UefiPresent);
        assert_eq!(String::from_utf8(out).unwrap(), format!("{}\n", status_line(true)));

        let mut out = Vec::new();
        assert_eq!(report(Ok(BootModeVerdict::UefiAbsent), &mut out), ExitStatus::UefiAbsent);
        assert_eq!(String::from_utf8(out).unwrap(), format!("{}\n", status_line(false)));
    }

    #[test]
    fn test_report_failures_write_nothing() {
        let mut out = Vec::new();
        let open = ImageOpenError::new("disk.img", Error::not_found("disk.img"));
        assert_eq!(report(Err(open.into()), &mut out), ExitStatus::Failed);

        let table = PartitionTableError(Error::checksum("GPT header"));
        assert_eq!(report(Err(table.into()), &mut out), ExitStatus::Failed);

        assert_eq!(report(Ok(BootModeVerdict::Indeterminate), &mut out), ExitStatus::Failed);
        assert!(out.is_empty());
    }
}
