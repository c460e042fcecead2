//! sitesync core library: domain types, configuration, errors.
//!
//! - [`types`]: discovery entries, canonical local file records, exclusions
//! - [`config`]: `appsettings.json` loading and validation
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::ConfigError;
pub use types::{DiscoveryEntry, ExclusionSet, GitCredentials, LocalFileRecord};
