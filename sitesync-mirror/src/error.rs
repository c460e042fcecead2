//! Error types for sitesync-mirror.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while mirroring sitemap content.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// A discovered URL cannot be mapped to a path under the working root.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Network or HTTP failure while downloading a URL.
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// The sitemap document was retrieved but is not a sitemap.
    #[error("malformed sitemap at {url}: {reason}")]
    Sitemap { url: String, reason: String },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`MirrorError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> MirrorError {
    MirrorError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn fetch_err(url: &str, reason: impl ToString) -> MirrorError {
    MirrorError::Fetch {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}
