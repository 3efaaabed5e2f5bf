//! Error types for tmpsync
//!
//! All modules use `TmpsyncResult<T>` as their return type.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tmpsync operations
pub type TmpsyncResult<T> = Result<T, TmpsyncError>;

/// Step of the config write pipeline that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStage {
    /// Serializing the registry snapshot
    Encode,
    /// Creating the temporary file next to the config
    CreateTemp,
    /// Writing the snapshot into the temporary file
    Write,
    /// Flushing the temporary file to stable storage
    Flush,
    /// Renaming the temporary file over the config
    Rename,
}

impl fmt::Display for PersistStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::Encode => "encode",
            Self::CreateTemp => "create temp file",
            Self::Write => "write",
            Self::Flush => "flush",
            Self::Rename => "rename",
        };
        write!(f, "{}", stage)
    }
}

/// All errors that can occur in tmpsync
#[derive(Error, Debug)]
pub enum TmpsyncError {
    // Request errors
    #[error("tmpsync: invalid option ({key} = {value}): {reason}")]
    InvalidOption {
        key: String,
        value: String,
        reason: String,
    },

    #[error("tmpsync: invalid volume name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("tmpsync: volume {0} not found")]
    NotFound(String),

    #[error("tmpsync: volume {0} is mounted")]
    Busy(String),

    // Platform errors
    #[error("tmpsync: could not mount tmpfs on {name}: {reason}")]
    MountFailed { name: String, reason: String },

    #[error("tmpsync: could not unmount {path}: {reason}")]
    UnmountFailed { path: PathBuf, reason: String },

    #[error("Unsupported platform: {0}. tmpsync requires Linux.")]
    UnsupportedPlatform(String),

    // Sync errors
    #[error("tmpsync: could not sync volume on {name}: {output}")]
    SyncFailed { name: String, output: String },

    // Persistence errors
    #[error("tmpsync: could not persist config {path} ({stage})")]
    PersistFailed {
        stage: PersistStage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Protocol errors
    #[error("Malformed plugin request: {0}")]
    Protocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TmpsyncError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a persist error for the given pipeline stage
    pub fn persist(stage: PersistStage, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PersistFailed {
            stage,
            path: path.into(),
            source,
        }
    }

    /// Create an invalid option error
    pub fn invalid_option(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOption {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error must stop the process
    ///
    /// Only a corrupt config at startup is fatal; everything else is
    /// reported back to the caller of the failing operation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConfigInvalid { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid { .. } => {
                Some("Fix or move the config file aside; it is never partially trusted")
            }
            Self::UnsupportedPlatform(_) => Some("tmpfs volumes are only available on Linux"),
            Self::SyncFailed { .. } => {
                Some("The volume stays mounted; fix the target or install rsync and unmount again")
            }
            Self::Busy(_) => Some("Unmount the volume before removing it"),
            _ => None,
        }
    }
}
