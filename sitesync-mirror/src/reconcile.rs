//! Fetch/delete set computation.
//!
//! Given the URLs a sitemap advertises and the files already under the
//! working root, decide what to (re)download and what is stale.
//!
//! Rules:
//! 1. Every discovered URL is mapped with [`crate::pathmap::map_url`] and
//!    canonicalised into a [`LocalFileRecord`]; unmappable URLs are reported
//!    in [`ReconciliationResult::invalid`] and otherwise ignored.
//! 2. Entries with no `lastmod`, or a `lastmod` at or after the cutoff, are
//!    fetched. Older ones are counted as skipped.
//! 3. Existing files not covered by any discovered URL (regardless of the
//!    cutoff) and not excluded are deleted.
//! 4. When nothing maps to a valid path, nothing is deleted.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use sitesync_core::types::{DiscoveryEntry, ExclusionSet, LocalFileRecord};

use crate::error::MirrorError;
use crate::pathmap;

/// One discovered entry paired with the local file it materialises into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchItem {
    pub entry: DiscoveryEntry,
    pub target: LocalFileRecord,
}

/// A discovered URL that could not be mapped to a local path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidEntry {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    /// In sitemap order, one item per distinct target.
    pub to_fetch: Vec<FetchItem>,
    pub to_delete: BTreeSet<LocalFileRecord>,
    pub skipped_by_cutoff: usize,
    pub invalid: Vec<InvalidEntry>,
}

/// `now - days`, or `None` when `days` is zero.
pub fn cutoff_from_days(now: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    if days == 0 {
        None
    } else {
        Some(now - Duration::days(i64::from(days)))
    }
}

/// Compute the fetch and delete sets for one run.
pub fn reconcile(
    root: &Path,
    existing: &[LocalFileRecord],
    discovered: &[DiscoveryEntry],
    exclusions: &ExclusionSet,
    cutoff: Option<DateTime<Utc>>,
) -> ReconciliationResult {
    let mut result = ReconciliationResult::default();
    let mut discovered_targets: HashSet<LocalFileRecord> = HashSet::new();
    let mut queued: HashSet<LocalFileRecord> = HashSet::new();

    for entry in discovered {
        let relative = match pathmap::map_url(&entry.url) {
            Ok(path) => path,
            Err(err) => {
                let reason = match err {
                    MirrorError::InvalidUrl { reason, .. } => reason,
                    other => other.to_string(),
                };
                tracing::warn!(url = %entry.url, %reason, "skipping unmappable URL");
                result.invalid.push(InvalidEntry {
                    url: entry.url.clone(),
                    reason,
                });
                continue;
            }
        };

        let target = LocalFileRecord::new(root, relative);
        discovered_targets.insert(target.clone());

        if !is_recent(entry, cutoff) {
            result.skipped_by_cutoff += 1;
            continue;
        }
        if queued.insert(target.clone()) {
            result.to_fetch.push(FetchItem {
                entry: entry.clone(),
                target,
            });
        }
    }

    if discovered_targets.is_empty() {
        if !existing.is_empty() {
            tracing::warn!(
                existing = existing.len(),
                "no valid discovered paths; leaving local files untouched"
            );
        }
        return result;
    }

    result.to_delete = existing
        .iter()
        .filter(|record| !discovered_targets.contains(*record))
        .filter(|record| !exclusions.excludes(record))
        .cloned()
        .collect();

    result
}

fn is_recent(entry: &DiscoveryEntry, cutoff: Option<DateTime<Utc>>) -> bool {
    match (entry.last_modified, cutoff) {
        (Some(modified), Some(cutoff)) => modified >= cutoff,
        _ => true,
    }
}
