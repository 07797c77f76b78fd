//! Control Center Error Types
//!
//! Centralized error handling using thiserror for type-safe errors.
//! Every failure carries an [`ErrorKind`] so callers can pick a remediation
//! (retry the download, free disk space, pick another model) without
//! inspecting message text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for control center operations
#[derive(Debug, Error)]
pub enum ControlError {
    /// Release index could not be reached or answered with an error status
    #[error("release catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// Release index answered with a body we could not understand
    #[error("release catalog response malformed: {0}")]
    CatalogParseError(String),

    /// Transport failure while downloading an asset
    #[error("network error: {0}")]
    Network(String),

    /// Final download response was not a 2xx
    #[error("download failed with HTTP status {status}")]
    DownloadFailed { status: u16 },

    /// Stream ended with a byte count different from the declared size
    #[error("incomplete download: received {received} of {expected} bytes")]
    IncompleteDownload { received: u64, expected: u64 },

    /// Archive is smaller than any real release could be
    #[error("archive is only {size} bytes, download is likely corrupt")]
    ArchiveTooSmall { size: u64 },

    #[error("unsupported archive format: {0}")]
    UnsupportedArchiveFormat(String),

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// Extraction succeeded but produced no files
    #[error("archive extracted no files into {0}")]
    EmptyExtraction(String),

    #[error("file system error: {0}")]
    Filesystem(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("failed to spawn server: {0}")]
    SpawnFailed(String),

    #[error("server process {pid} did not exit after being killed")]
    ProcessTerminationTimeout { pid: u32 },

    #[error("config error: {0}")]
    ConfigIo(String),

    /// Binaries directory is leased by another operation
    #[error("binaries directory is busy ({holder} in progress)")]
    ResourceBusy { holder: String },

    /// Asset named by the caller is not part of the catalog
    #[error("invalid asset: {0}")]
    InvalidAsset(String),
}

/// Stable, serializable discriminant of [`ControlError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    CatalogUnavailable,
    CatalogParseError,
    Network,
    DownloadFailed,
    IncompleteDownload,
    ArchiveTooSmall,
    UnsupportedArchiveFormat,
    CorruptArchive,
    EmptyExtraction,
    Filesystem,
    ModelNotFound,
    SpawnFailed,
    ProcessTerminationTimeout,
    ConfigIoError,
    ResourceBusy,
    InvalidAsset,
}

impl ErrorKind {
    /// Whether simply repeating the command is a sensible remediation.
    ///
    /// Truncated or corrupt downloads are retryable: the next attempt fetches
    /// a fresh copy. Disk, config and missing-model failures need the user.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::CatalogUnavailable
                | ErrorKind::Network
                | ErrorKind::DownloadFailed
                | ErrorKind::IncompleteDownload
                | ErrorKind::ArchiveTooSmall
                | ErrorKind::CorruptArchive
                | ErrorKind::ResourceBusy
        )
    }
}

impl ControlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::CatalogUnavailable(_) => ErrorKind::CatalogUnavailable,
            ControlError::CatalogParseError(_) => ErrorKind::CatalogParseError,
            ControlError::Network(_) => ErrorKind::Network,
            ControlError::DownloadFailed { .. } => ErrorKind::DownloadFailed,
            ControlError::IncompleteDownload { .. } => ErrorKind::IncompleteDownload,
            ControlError::ArchiveTooSmall { .. } => ErrorKind::ArchiveTooSmall,
            ControlError::UnsupportedArchiveFormat(_) => ErrorKind::UnsupportedArchiveFormat,
            ControlError::CorruptArchive(_) => ErrorKind::CorruptArchive,
            ControlError::EmptyExtraction(_) => ErrorKind::EmptyExtraction,
            ControlError::Filesystem(_) => ErrorKind::Filesystem,
            ControlError::ModelNotFound(_) => ErrorKind::ModelNotFound,
            ControlError::SpawnFailed(_) => ErrorKind::SpawnFailed,
            ControlError::ProcessTerminationTimeout { .. } => ErrorKind::ProcessTerminationTimeout,
            ControlError::ConfigIo(_) => ErrorKind::ConfigIoError,
            ControlError::ResourceBusy { .. } => ErrorKind::ResourceBusy,
            ControlError::InvalidAsset(_) => ErrorKind::InvalidAsset,
        }
    }

    pub fn busy(holder: impl Into<String>) -> Self {
        ControlError::ResourceBusy {
            holder: holder.into(),
        }
    }
}

impl From<std::io::Error> for ControlError {
    fn from(err: std::io::Error) -> Self {
        ControlError::Filesystem(err.to_string())
    }
}

/// Structured failure handed across the command boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("[{kind:?}] {message}")]
pub struct CommandError {
    pub kind: ErrorKind,
    /// Display text only; never match on it
    pub message: String,
    pub retryable: bool,
}

impl From<ControlError> for CommandError {
    fn from(err: ControlError) -> Self {
        let kind = err.kind();
        Self {
            kind,
            message: err.to_string(),
            retryable: kind.is_retryable(),
        }
    }
}

/// Result type alias for core operations
pub type ControlResult<T> = Result<T, ControlError>;

/// Result type alias for command boundary calls
pub type CommandResult<T> = Result<T, CommandError>;
