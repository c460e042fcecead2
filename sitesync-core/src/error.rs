//! Error types for sitesync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating the JSON configuration.
///
/// All of these are fatal and occur before the instance lock is taken.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found at {path}")]
    NotFound { path: PathBuf },

    /// Underlying I/O failure while reading the file.
    #[error("failed to read configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed JSON, or a value of the wrong type.
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A field is present but its value cannot be used.
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
