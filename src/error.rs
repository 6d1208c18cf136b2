//! Error types for arcsync

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for backup operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("Invalid size format: {input}")]
    InvalidSizeFormat { input: String },

    #[error("Invalid directory path: {}", path.display())]
    BaseDirectory { path: PathBuf },

    #[error("Unsupported archive type: {format}")]
    UnsupportedFormat { format: String },

    #[error("Failed to write archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("Remote sync failed: {reason}")]
    RemoteSync { reason: String },

    #[error("Backup stage {stage} did not complete: {reason}")]
    Stage { stage: String, reason: String },

    #[error("Backup pipeline already ran")]
    AlreadyRun,
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Error::Configuration {
            reason: reason.into(),
        }
    }
}

/// Result type alias for backup operations
pub type Result<T> = std::result::Result<T, Error>;
