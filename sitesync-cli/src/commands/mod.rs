pub mod config;
pub mod plan;
pub mod run;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use sitesync_core::{config as app_config, AppConfig};

/// `--config` flag shared by every subcommand.
#[derive(Args, Debug)]
pub struct ConfigPathArg {
    /// Path to the JSON configuration (default: appsettings.json beside the executable).
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl ConfigPathArg {
    pub fn path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(app_config::default_config_path)
    }

    /// Load and validate the configuration.
    pub fn load(&self) -> Result<AppConfig> {
        let path = self.path();
        app_config::load_at(&path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))
    }
}
