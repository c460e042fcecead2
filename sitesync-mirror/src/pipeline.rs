//! Mirror pipeline shared by `sitesync run` and `sitesync plan`.
//!
//! sitemap → scan → reconcile → fetch + write → delete. Every write and
//! delete has finished by the time [`mirror`] returns.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use sitesync_core::types::{DiscoveryEntry, ExclusionSet};
use sitesync_core::AppConfig;

use crate::error::MirrorError;
use crate::fetch::ContentFetcher;
use crate::reconcile::{self, cutoff_from_days, InvalidEntry, ReconciliationResult};
use crate::scan;
use crate::sitemap::SitemapSource;
use crate::writer::{self, WriteResult};

/// Inputs for one mirror pass.
#[derive(Debug, Clone)]
pub struct MirrorOptions {
    pub root: PathBuf,
    pub sitemap_url: String,
    pub cutoff: Option<DateTime<Utc>>,
    pub exclusions: ExclusionSet,
}

impl MirrorOptions {
    pub fn from_config(config: &AppConfig, now: DateTime<Utc>) -> Self {
        Self {
            root: config.git_directory.clone(),
            sitemap_url: config.sitemap_url.clone(),
            cutoff: cutoff_from_days(now, config.days_to_consider),
            exclusions: config.exclusions(),
        }
    }
}

/// A URL whose content could not be fetched or written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFetch {
    pub url: String,
    pub error: String,
}

/// What a mirror pass did. Paths are relative to the working root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorReport {
    pub discovered: usize,
    pub written: Vec<PathBuf>,
    pub unchanged: usize,
    pub skipped_by_cutoff: usize,
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<FailedFetch>,
    pub invalid: Vec<InvalidEntry>,
    /// Set when the sitemap could not be read; discovery was treated as empty.
    pub sitemap_error: Option<String>,
}

impl MirrorReport {
    pub fn is_success(&self) -> bool {
        self.sitemap_error.is_none()
    }
}

/// Read-only view of what a mirror pass would do.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub discovered: usize,
    pub reconciliation: ReconciliationResult,
    pub sitemap_error: Option<String>,
}

fn discover(opts: &MirrorOptions, source: &dyn SitemapSource) -> (Vec<DiscoveryEntry>, Option<String>) {
    match source.fetch(&opts.sitemap_url) {
        Ok(entries) => (entries, None),
        Err(err) => {
            tracing::error!(url = %opts.sitemap_url, error = %err, "sitemap unavailable; nothing will be fetched or deleted");
            (Vec::new(), Some(err.to_string()))
        }
    }
}

/// Compute the fetch and delete sets without touching the filesystem.
pub fn plan(opts: &MirrorOptions, source: &dyn SitemapSource) -> Result<Plan, MirrorError> {
    let (discovered, sitemap_error) = discover(opts, source);
    let existing = scan::scan_tree(&opts.root)?;
    let reconciliation = reconcile::reconcile(
        &opts.root,
        &existing,
        &discovered,
        &opts.exclusions,
        opts.cutoff,
    );
    Ok(Plan {
        discovered: discovered.len(),
        reconciliation,
        sitemap_error,
    })
}

/// Run a full mirror pass against the working root.
///
/// A failing URL is logged and recorded, and the pass moves on. Scan and
/// delete failures abort the pass.
pub fn mirror(
    opts: &MirrorOptions,
    source: &dyn SitemapSource,
    fetcher: &dyn ContentFetcher,
) -> Result<MirrorReport, MirrorError> {
    let plan = plan(opts, source)?;
    let ReconciliationResult {
        to_fetch,
        to_delete,
        skipped_by_cutoff,
        invalid,
    } = plan.reconciliation;

    let mut report = MirrorReport {
        discovered: plan.discovered,
        skipped_by_cutoff,
        invalid,
        sitemap_error: plan.sitemap_error,
        ..MirrorReport::default()
    };

    for item in to_fetch {
        let url = item.entry.url.as_str();
        let outcome = fetcher
            .fetch(url)
            .and_then(|body| writer::write_if_changed(item.target.path(), &body));
        match outcome {
            Ok(WriteResult::Written { path }) => report.written.push(relative(&opts.root, &path)),
            Ok(WriteResult::Unchanged { .. }) => report.unchanged += 1,
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "skipping URL");
                report.failed.push(FailedFetch {
                    url: url.to_string(),
                    error: err.to_string(),
                });
            }
        }
    }

    for record in &to_delete {
        if writer::remove_and_prune(&opts.root, record.path())? {
            report.deleted.push(record.relative_to(&opts.root));
        }
    }

    tracing::info!(
        discovered = report.discovered,
        written = report.written.len(),
        unchanged = report.unchanged,
        skipped = report.skipped_by_cutoff,
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        "mirror pass complete"
    );
    Ok(report)
}

fn relative(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}
