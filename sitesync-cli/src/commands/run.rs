//! `sitesync run`: one locked pull → mirror → publish cycle.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use sitesync_runner::{http_sources, run_once, RunOutcome, RunReport};

use super::ConfigPathArg;

/// Arguments for `sitesync run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigPathArg,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let config = self.config.load()?;
        let (sitemap, fetcher) = http_sources(&config);

        let outcome = run_once(&config, &sitemap, &fetcher).context("sync run failed")?;
        match outcome {
            RunOutcome::Skipped { lock_path } => {
                println!(
                    "{} another instance holds {}; skipped",
                    "·".bright_black(),
                    lock_path.display()
                );
                Ok(())
            }
            RunOutcome::Completed(report) => {
                print_summary(&report);
                if let Some(err) = &report.mirror.sitemap_error {
                    anyhow::bail!("sitemap could not be read: {err}");
                }
                println!("{} sync complete", "✓".green().bold());
                Ok(())
            }
        }
    }
}

fn print_summary(report: &RunReport) {
    let pull = &report.pull;
    let head = pull.head_after.as_deref().map(short).unwrap_or("-");
    let mut pulled = format!("pulled     {head}");
    if let Some(stash) = &pull.stash_branch {
        pulled.push_str(&format!(" (local changes reapplied from {stash})"));
    }
    if !pull.recovered_stashes.is_empty() {
        pulled.push_str(&format!(
            " ({} stash branch(es) recovered)",
            pull.recovered_stashes.len()
        ));
    }
    println!("{pulled}");

    let mirror = &report.mirror;
    println!("discovered {}", mirror.discovered);
    println!("fetched    {}", mirror.written.len());
    for path in &mirror.written {
        println!("  ✎  {}", path.display());
    }
    println!("unchanged  {}", mirror.unchanged);
    println!("skipped    {}", mirror.skipped_by_cutoff + mirror.invalid.len());
    println!("deleted    {}", mirror.deleted.len());
    for path in &mirror.deleted {
        println!("  ✗  {}", path.display());
    }
    println!("failed     {}", mirror.failed.len());
    for failure in &mirror.failed {
        println!("  {}  {}: {}", "!".yellow(), failure.url, failure.error);
    }

    match &report.publish.commit {
        Some(commit) => println!("published  {}", short(commit)),
        None => println!("published  nothing to commit"),
    }
}

fn short(commit: &str) -> &str {
    commit.get(..8).unwrap_or(commit)
}
