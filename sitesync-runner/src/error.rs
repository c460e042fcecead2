use std::path::PathBuf;

use thiserror::Error;

use sitesync_core::ConfigError;
use sitesync_git::GitError;
use sitesync_mirror::MirrorError;

/// Failure acquiring or releasing the instance lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error surface for one orchestrated run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("mirror error: {0}")]
    Mirror(#[from] MirrorError),

    #[error("git error: {0}")]
    Git(#[from] GitError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RunError {
    RunError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn lock_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> LockError {
    LockError::Io {
        path: path.into(),
        source,
    }
}
