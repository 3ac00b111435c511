//! Error types for livestate operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Filesystem errors raised while touching the backing file.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Open failed for {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Create directory failed for {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Stat failed for {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to rewind {path}: {source}")]
    Seek {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Read failed for {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Truncate failed for {path}: {source}")]
    Truncate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Write failed for {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Sync failed for {path}: {source}")]
    Sync {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Remove failed for {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    /// The path the failed operation targeted.
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Open { path, .. }
            | Self::CreateDir { path, .. }
            | Self::Stat { path, .. }
            | Self::Seek { path, .. }
            | Self::Read { path, .. }
            | Self::Truncate { path, .. }
            | Self::Write { path, .. }
            | Self::Sync { path, .. }
            | Self::Remove { path, .. } => path,
        }
    }

    /// The underlying I/O error kind.
    pub fn io_kind(&self) -> io::ErrorKind {
        match self {
            Self::Open { source, .. }
            | Self::CreateDir { source, .. }
            | Self::Stat { source, .. }
            | Self::Seek { source, .. }
            | Self::Read { source, .. }
            | Self::Truncate { source, .. }
            | Self::Write { source, .. }
            | Self::Sync { source, .. }
            | Self::Remove { source, .. } => source.kind(),
        }
    }
}

/// JSON encoding and decoding errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid JSON in {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Encoding state for {path} failed: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Coarse classification used by error policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Open, stat, seek, read, write, sync, mkdir or remove failure.
    Io,
    /// Nonempty content that is not valid JSON for the state type.
    Decode,
    /// The in-memory state could not be serialized.
    Encode,
    /// Rejected configuration.
    Config,
}

/// Master error type for all livestate errors.
#[derive(Debug, Error)]
pub enum LiveStateError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl LiveStateError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Storage(_) => ErrorCategory::Io,
            Self::Codec(CodecError::Decode { .. }) => ErrorCategory::Decode,
            Self::Codec(CodecError::Encode { .. }) => ErrorCategory::Encode,
            Self::Config(_) => ErrorCategory::Config,
        }
    }
}

/// Result type alias for livestate operations.
pub type LiveStateResult<T> = Result<T, LiveStateError>;

// =============================================================================
// TESTS
// =============================================================================
