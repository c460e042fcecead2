//! sitesync: mirror a website's sitemap into a git repository.
//!
//! # Usage
//!
//! ```text
//! sitesync run [--config <path>]
//! sitesync plan [--config <path>] [--json]
//! sitesync config [--config <path>]
//! ```
//!
//! Without `--config`, `appsettings.json` next to the executable is used.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config::ConfigArgs, plan::PlanArgs, run::RunArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "sitesync",
    version,
    about = "Mirror a website's sitemap into a git repository and push it",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pull, mirror the sitemap, then commit and push, under the instance lock.
    Run(RunArgs),

    /// Show what a run would fetch, delete and skip, without changing anything.
    Plan(PlanArgs),

    /// Validate the configuration and print it with secrets redacted.
    Config(ConfigArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    sitesync_runner::init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Plan(args) => args.run(),
        Commands::Config(args) => args.run(),
    }
}
