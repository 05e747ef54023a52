//! Error types for rom-dl
//!
//! Every failure a download task can hit is represented here. Errors are grouped
//! into the categories the task engine cares about (see [`ErrorKind`]): whether an
//! error is retried, and what the user is told, both depend on the category.
//!
//! Errors never reach the UI as values. The task engine converts them into an
//! [`Outcome`](crate::types::Outcome) message at the worker boundary.

use crate::types::TaskId;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for rom-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for rom-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "provider.api_key_path")
        key: Option<String>,
    },

    /// The file-host API key is absent or empty
    #[error("{provider} API key missing: add your key to {}", path_display(.path))]
    MissingCredential {
        /// Provider the key belongs to
        provider: String,
        /// Where the key was expected
        path: Option<PathBuf>,
    },

    /// The remote host reports that the requested file does not exist
    #[error("file not found on remote host: {url}")]
    RemoteNotFound {
        /// The source URL that was requested
        url: String,
    },

    /// Network error (connect failure, reset, TLS, body decode)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// Status code returned by the server
        status: u16,
        /// Requested URL
        url: String,
    },

    /// No data arrived within the read timeout
    #[error("timed out after {secs}s waiting for {url}")]
    Timeout {
        /// Timeout that expired, in seconds
        secs: u64,
        /// Requested URL
        url: String,
    },

    /// The file-host API answered with something we could not interpret
    #[error("unexpected response from {provider}: {reason}")]
    Provider {
        /// Provider name
        provider: String,
        /// What was wrong with the response
        reason: String,
    },

    /// Archive extraction error
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Destination directory cannot be written to
    #[error("destination directory is not writable: {}", .path.display())]
    NotWritable {
        /// The directory that failed the write probe
        path: PathBuf,
    },

    /// Insufficient disk space
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the operation
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (history file, API payloads)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Task was cancelled by the user
    #[error("cancelled")]
    Cancelled,

    /// No live or finished task with this id
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

fn path_display(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "the provider configuration".to_string(),
    }
}

/// Archive extraction errors
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// File extension does not match a supported archive format
    #[error("unsupported archive format: {}", .archive.display())]
    Unsupported {
        /// The file that was handed to the extractor
        archive: PathBuf,
    },

    /// The listing pass returned no members
    #[error("archive {} lists no entries", .archive.display())]
    EmptyListing {
        /// The archive that was listed
        archive: PathBuf,
    },

    /// Reading or unpacking the archive failed
    #[error("extraction failed for {}: {reason}", .archive.display())]
    Failed {
        /// The archive that failed to extract
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// A member from the listing did not show up on disk after extraction
    #[error("{member} missing after extracting {}", .archive.display())]
    MissingMember {
        /// The archive that was extracted
        archive: PathBuf,
        /// Member path as listed in the archive
        member: String,
    },
}

/// Error categories used for retry decisions and log fields
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// User configuration problem (missing credential, bad setting)
    Configuration,
    /// The remote reports the resource does not exist
    RemoteNotFound,
    /// Timeout, connection reset, non-2xx status
    Transport,
    /// The file-host API answered but refused the request
    Rejected,
    /// Corrupt archive, missing member, unpack failure
    Extraction,
    /// Unwritable directory, disk full, local I/O
    Filesystem,
    /// Cancelled by the user
    Cancelled,
    /// Anything else
    Internal,
}

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. } | Error::MissingCredential { .. } => ErrorKind::Configuration,
            Error::RemoteNotFound { .. } => ErrorKind::RemoteNotFound,
            Error::Network(_)
            | Error::HttpStatus { .. }
            | Error::Timeout { .. } => ErrorKind::Transport,
            Error::Provider { .. } => ErrorKind::Rejected,
            Error::Extraction(_) => ErrorKind::Extraction,
            Error::NotWritable { .. } | Error::InsufficientSpace { .. } | Error::Io(_) => {
                ErrorKind::Filesystem
            }
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Serialization(_)
            | Error::TaskNotFound(_)
            | Error::ShuttingDown
            | Error::Other(_) => ErrorKind::Internal,
        }
    }

    /// Machine-readable error code, used as a structured log field
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::MissingCredential { .. } => "missing_credential",
            Error::RemoteNotFound { .. } => "remote_not_found",
            Error::Network(_) => "network_error",
            Error::HttpStatus { .. } => "http_status",
            Error::Timeout { .. } => "timeout",
            Error::Provider { .. } => "provider_error",
            Error::Extraction(e) => match e {
                ExtractionError::Unsupported { .. } => "unsupported_archive",
                ExtractionError::EmptyListing { .. } => "empty_listing",
                ExtractionError::Failed { .. } => "extraction_failed",
                ExtractionError::MissingMember { .. } => "missing_member",
            },
            Error::NotWritable { .. } => "not_writable",
            Error::InsufficientSpace { .. } => "insufficient_space",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Cancelled => "cancelled",
            Error::TaskNotFound(_) => "task_not_found",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}
