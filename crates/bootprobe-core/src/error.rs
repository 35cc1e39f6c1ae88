//! Error types for image inspection

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Low-level error raised while decoding containers and partition tables
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error while reading the image
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid container format or corrupted container metadata
    #[error("Invalid vault format: {0}")]
    InvalidVault(String),

    /// Invalid partition table structure
    #[error("Invalid zone table: {0}")]
    InvalidZoneTable(String),

    /// Checksum verification failed
    #[error("Checksum verification failed: {0}")]
    ChecksumVerification(String),

    /// Declared structure extends past the end of the image
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// Recognized but unsupported format or feature
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// File not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

/// Result type alias for low-level operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid vault error
    pub fn invalid_vault(msg: impl Into<String>) -> Self {
        Error::InvalidVault(msg.into())
    }

    /// Create an invalid zone table error
    pub fn invalid_zone_table(msg: impl Into<String>) -> Self {
        Error::InvalidZoneTable(msg.into())
    }

    /// Create a checksum verification error
    pub fn checksum(msg: impl Into<String>) -> Self {
        Error::ChecksumVerification(msg.into())
    }

    /// Create an out of bounds error
    pub fn out_of_bounds(msg: impl Into<String>) -> Self {
        Error::OutOfBounds(msg.into())
    }

    /// Create an unsupported error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Error::PermissionDenied(msg.into())
    }

    /// Whether retrying the same operation later could succeed
    ///
    /// Only conditions outside the image bytes qualify: a file that has not
    /// materialized yet, or an interrupted read. Malformed content never does.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::NotFound
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// The image could not be opened or its container was not recognized
#[derive(Error, Debug)]
#[error("cannot open image '{}'", path.display())]
pub struct ImageOpenError {
    path: PathBuf,
    #[source]
    source: Error,
}

impl ImageOpenError {
    pub fn new(path: impl AsRef<Path>, source: Error) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Path that failed to open
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Underlying cause
    pub fn cause(&self) -> &Error {
        &self.source
    }

    /// Whether the orchestrator may retry this invocation
    pub fn is_retryable(&self) -> bool {
        self.source.is_transient()
    }
}

/// The partition table is missing, corrupt, or inconsistent with the image
#[derive(Error, Debug)]
#[error("cannot read partition table")]
pub struct PartitionTableError(#[from] pub Error);

impl PartitionTableError {
    /// Underlying cause
    pub fn cause(&self) -> &Error {
        &self.0
    }
}

impl From<io::Error> for PartitionTableError {
    fn from(e: io::Error) -> Self {
        PartitionTableError(Error::Io(e))
    }
}

/// Failure of a single inspection, tagged by the stage that failed
#[derive(Error, Debug)]
pub enum InspectError {
    #[error(transparent)]
    ImageOpen(#[from] ImageOpenError),

    #[error(transparent)]
    PartitionTable(#[from] PartitionTableError),
}

impl InspectError {
    /// Short name of the failing stage, used in diagnostics
    pub fn stage(&self) -> &'static str {
        match self {
            InspectError::ImageOpen(_) => "open-image",
            InspectError::PartitionTable(_) => "read-partition-table",
        }
    }

    /// Whether the orchestrator may retry this invocation
    pub fn is_retryable(&self) -> bool {
        match self {
            InspectError::ImageOpen(e) => e.is_retryable(),
            InspectError::PartitionTable(_) => false,
        }
    }
}
