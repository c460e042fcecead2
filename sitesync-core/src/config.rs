//! `appsettings.json` loading and validation.
//!
//! # Format
//!
//! ```json
//! {
//!   "GitDirectory": "/srv/mirror",
//!   "LockFileDirectory": "/var/lock/sitesync",
//!   "GitCredentials": { "Username": "bot", "Password": "…", "Email": "bot@example.com" },
//!   "SitemapUrl": "https://example.com/sitemap.xml",
//!   "DaysToConsider": 30,
//!   "AppHostDomain": "https://app.example.com",
//!   "NoAppHostDomain": "https://www.example.com",
//!   "ExcludedPaths": ["README.md", "assets"]
//! }
//! ```
//!
//! Parsing is strict JSON (no comments, no trailing commas). Unknown keys are
//! ignored. Every failure maps to a [`ConfigError`] before any lock is taken.
//!
//! # API pattern
//!
//! - `load_at(path)`: explicit path; used by tests with temp files
//! - `load()`: `appsettings.json` beside the running executable

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::types::{ExclusionSet, GitCredentials, LocalFileRecord};

/// File name looked up next to the executable when no path is given.
pub const CONFIG_FILE_NAME: &str = "appsettings.json";

pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_COMMIT_MESSAGE: &str = "Updated files from sitemap";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_GIT_STALL_TIMEOUT_SECS: u64 = 60;

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppConfig {
    #[serde(default)]
    pub git_directory: PathBuf,

    #[serde(default)]
    pub lock_file_directory: PathBuf,

    pub git_credentials: Option<GitCredentials>,

    #[serde(default)]
    pub sitemap_url: String,

    /// Only entries modified within this many days are re-downloaded; `0` disables the cutoff.
    #[serde(default)]
    pub days_to_consider: u32,

    #[serde(default)]
    pub app_host_domain: String,

    #[serde(default)]
    pub no_app_host_domain: String,

    #[serde(default)]
    pub excluded_paths: Vec<PathBuf>,

    #[serde(default = "default_remote")]
    pub remote_name: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default = "default_commit_message")]
    pub commit_message: String,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_git_stall_timeout")]
    pub git_stall_timeout_secs: u64,
}

fn default_remote() -> String {
    DEFAULT_REMOTE.to_string()
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_commit_message() -> String {
    DEFAULT_COMMIT_MESSAGE.to_string()
}

fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_git_stall_timeout() -> u64 {
    DEFAULT_GIT_STALL_TIMEOUT_SECS
}

impl AppConfig {
    /// Credentials, guaranteed present after [`AppConfig::validate`].
    pub fn credentials(&self) -> Result<&GitCredentials, ConfigError> {
        self.git_credentials
            .as_ref()
            .ok_or_else(|| ConfigError::invalid("GitCredentials", "not specified"))
    }

    /// Exclusions resolved against the working root.
    pub fn exclusions(&self) -> ExclusionSet {
        ExclusionSet::new(&self.git_directory, &self.excluded_paths)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn git_stall_timeout(&self) -> Duration {
        Duration::from_secs(self.git_stall_timeout_secs)
    }

    /// Check every field the run depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.git_directory.as_os_str().is_empty() {
            return Err(ConfigError::invalid("GitDirectory", "not specified"));
        }
        if !self.git_directory.is_dir() {
            return Err(ConfigError::invalid(
                "GitDirectory",
                format!("{} is not a directory", self.git_directory.display()),
            ));
        }
        if self.lock_file_directory.as_os_str().is_empty() {
            return Err(ConfigError::invalid("LockFileDirectory", "not specified"));
        }
        if self.lock_dir_in_working_tree() {
            return Err(ConfigError::invalid(
                "LockFileDirectory",
                format!(
                    "{} is inside GitDirectory; the lock file would be mirrored and committed",
                    self.lock_file_directory.display()
                ),
            ));
        }

        let credentials = self.credentials()?;
        if credentials.username.trim().is_empty() {
            return Err(ConfigError::invalid(
                "GitCredentials.Username",
                "must not be empty",
            ));
        }

        if self.sitemap_url.trim().is_empty() {
            return Err(ConfigError::invalid("SitemapUrl", "not specified"));
        }
        let sitemap = Url::parse(&self.sitemap_url)
            .map_err(|e| ConfigError::invalid("SitemapUrl", e.to_string()))?;
        if !matches!(sitemap.scheme(), "http" | "https" | "file") {
            return Err(ConfigError::invalid(
                "SitemapUrl",
                format!("unsupported scheme '{}'", sitemap.scheme()),
            ));
        }

        validate_host("AppHostDomain", &self.app_host_domain)?;
        validate_host("NoAppHostDomain", &self.no_app_host_domain)?;

        if self.remote_name.trim().is_empty() {
            return Err(ConfigError::invalid("RemoteName", "must not be empty"));
        }
        if self.branch.trim().is_empty() {
            return Err(ConfigError::invalid("Branch", "must not be empty"));
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::invalid("HttpTimeoutSecs", "must be positive"));
        }
        Ok(())
    }

    /// Lock directory compared with the same canonical key as mirrored files.
    fn lock_dir_in_working_tree(&self) -> bool {
        let cwd = std::env::current_dir().unwrap_or_default();
        let lock_dir = LocalFileRecord::new(&cwd, &self.lock_file_directory);
        let git_dir = LocalFileRecord::new(&cwd, &self.git_directory);
        lock_dir.is_within(&git_dir)
    }
}

fn validate_host(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Ok(());
    }
    match Url::parse(value) {
        Ok(url) if url.has_host() => Ok(()),
        Ok(_) => Err(ConfigError::invalid(field, "URL has no host")),
        Err(e) => Err(ConfigError::invalid(
            field,
            format!("'{value}' is not an absolute URL: {e}"),
        )),
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// `appsettings.json` beside the running executable, or in the working
/// directory when the executable path cannot be determined.
pub fn default_config_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(CONFIG_FILE_NAME)))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// Parse configuration text without validating it.
///
/// `path` is only used for error messages.
pub fn parse_str(path: &Path, contents: &str) -> Result<AppConfig, ConfigError> {
    serde_json::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate the configuration at `path`.
pub fn load_at(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_str(path, &contents)?;
    config.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper using [`default_config_path`].
pub fn load() -> Result<AppConfig, ConfigError> {
    load_at(&default_config_path())
}
