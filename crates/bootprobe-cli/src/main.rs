//! bootprobe - report whether a disk image is set up for UEFI boot
//!
//! Looks for an EFI System Partition in the image's partition table and
//! reports the result through the exit code and a single status line.

mod args;
mod inspect;
mod report;

use args::Cli;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use report::ExitStatus;
use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let stdout = io::stdout();
    run(std::env::args_os(), &mut stdout.lock()).into()
}

/// Parse arguments, inspect the image and report the outcome on `out`
fn run<I, T>(args: I, out: &mut dyn Write) -> ExitStatus
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => return usage_error(err, out),
    };

    init_logging(&cli.log_level);

    let Some(image) = cli.image.as_deref() else {
        let err = Cli::command().error(
            ErrorKind::MissingRequiredArgument,
            "the following required argument was not provided: <IMAGE>",
        );
        return usage_error(err, out);
    };

    tracing::info!(
        image = %image.display(),
        version = env!("CARGO_PKG_VERSION"),
        "Starting UEFI inspection"
    );
    let outcome = inspect::inspect(image, &cli.image_config(), &cli.read_options());
    report::report(outcome, out)
}

/// Help and version requests succeed; anything else is a usage error
fn usage_error(err: clap::Error, out: &mut dyn Write) -> ExitStatus {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            if write!(out, "{}", err).and_then(|_| out.flush()).is_err() {
                return ExitStatus::Usage;
            }
            ExitStatus::Success
        }
        _ => {
            let _ = err.print();
            ExitStatus::Usage
        }
    }
}

/// Diagnostics go to stderr so stdout carries only the status line
fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}
