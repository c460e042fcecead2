//! `sitesync config`: validated configuration with the password redacted.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use sitesync_core::AppConfig;

use super::ConfigPathArg;

const REDACTED: &str = "<redacted>";

/// Arguments for `sitesync config`.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub config: ConfigPathArg,
}

impl ConfigArgs {
    pub fn run(self) -> Result<()> {
        let config = self.config.load()?;
        let rendered = redacted_json(&config)?;
        println!(
            "{} {}",
            "✓".green().bold(),
            format!("configuration OK ({})", self.config.path().display()).bold()
        );
        println!("{rendered}");
        Ok(())
    }
}

fn redacted_json(config: &AppConfig) -> Result<String> {
    let mut value = serde_json::to_value(config).context("failed to serialize configuration")?;
    if let Some(credentials) = value
        .get_mut("GitCredentials")
        .and_then(Value::as_object_mut)
    {
        credentials.insert("Password".to_string(), Value::from(REDACTED));
    }
    serde_json::to_string_pretty(&value).context("failed to serialize configuration")
}
