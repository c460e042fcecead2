//! `sitesync plan`: the fetch/delete/skip sets a run would act on.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use sitesync_mirror::{plan, InvalidEntry, MirrorOptions, Plan};
use sitesync_runner::http_sources;

use super::ConfigPathArg;

/// Arguments for `sitesync plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub config: ConfigPathArg,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl PlanArgs {
    pub fn run(self) -> Result<()> {
        let config = self.config.load()?;
        let opts = MirrorOptions::from_config(&config, Utc::now());
        let (sitemap, _) = http_sources(&config);
        let plan = plan(&opts, &sitemap).context("failed to scan the working tree")?;
        let report = PlanJson::new(&opts, plan);

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize plan JSON")?
            );
        } else {
            print_table(&report);
        }

        if let Some(err) = &report.sitemap_error {
            anyhow::bail!("sitemap could not be read: {err}");
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct PlanJson {
    discovered: usize,
    skipped_by_cutoff: usize,
    fetch: Vec<FetchJson>,
    delete: Vec<PathBuf>,
    invalid: Vec<InvalidEntry>,
    sitemap_error: Option<String>,
}

#[derive(Serialize)]
struct FetchJson {
    url: String,
    path: PathBuf,
}

impl PlanJson {
    fn new(opts: &MirrorOptions, plan: Plan) -> Self {
        let reconciliation = plan.reconciliation;
        Self {
            discovered: plan.discovered,
            skipped_by_cutoff: reconciliation.skipped_by_cutoff,
            fetch: reconciliation
                .to_fetch
                .into_iter()
                .map(|item| FetchJson {
                    path: item.target.relative_to(&opts.root),
                    url: item.entry.url,
                })
                .collect(),
            delete: reconciliation
                .to_delete
                .iter()
                .map(|record| record.relative_to(&opts.root))
                .collect(),
            invalid: reconciliation.invalid,
            sitemap_error: plan.sitemap_error,
        }
    }
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "source")]
    source: String,
}

fn print_table(report: &PlanJson) {
    println!(
        "sitesync v{} | {} discovered | {} to fetch | {} to delete | {} skipped",
        env!("CARGO_PKG_VERSION"),
        report.discovered,
        report.fetch.len(),
        report.delete.len(),
        report.skipped_by_cutoff,
    );

    let mut rows: Vec<PlanRow> = report
        .fetch
        .iter()
        .map(|item| PlanRow {
            action: "fetch".green().to_string(),
            path: item.path.display().to_string(),
            source: item.url.clone(),
        })
        .collect();
    rows.extend(report.delete.iter().map(|path| PlanRow {
        action: "delete".red().to_string(),
        path: path.display().to_string(),
        source: "-".to_string(),
    }));
    rows.extend(report.invalid.iter().map(|entry| PlanRow {
        action: "invalid".yellow().to_string(),
        path: entry.reason.clone(),
        source: entry.url.clone(),
    }));

    if rows.is_empty() {
        println!("Nothing to do.");
        return;
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
