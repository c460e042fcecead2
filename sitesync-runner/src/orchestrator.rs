//! One orchestrated run: lock → pull → mirror → publish → unlock.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use sitesync_core::AppConfig;
use sitesync_git::{
    CommitIdentity, HttpCredentials, PublishReport, PullReport, SyncEngine, SyncEngineOptions,
};
use sitesync_mirror::{
    mirror, ContentFetcher, ContentRewriter, HttpContentFetcher, MirrorOptions, MirrorReport,
    SitemapReader, SitemapSource,
};

use crate::error::{io_err, RunError};
use crate::lock::InstanceLock;
use crate::paths;

/// Reports from each step of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pull: PullReport,
    pub mirror: MirrorReport,
    pub publish: PublishReport,
}

impl RunReport {
    /// False when the sitemap could not be read, even though the run went
    /// through to publish.
    pub fn is_success(&self) -> bool {
        self.mirror.is_success()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Another instance held the lock; nothing was touched.
    Skipped { lock_path: PathBuf },
    Completed(RunReport),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            RunOutcome::Skipped { .. } => true,
            RunOutcome::Completed(report) => report.is_success(),
        }
    }
}

/// Sync engine settings derived from configuration.
pub fn engine_options(config: &AppConfig) -> Result<SyncEngineOptions, RunError> {
    let credentials = config.credentials()?;
    let identity = CommitIdentity {
        name: credentials.username.clone(),
        email: credentials.email_or_default(),
    };
    let mut opts = SyncEngineOptions::new(&config.git_directory, identity);
    opts.remote = config.remote_name.clone();
    opts.branch = config.branch.clone();
    opts.credentials = Some(HttpCredentials {
        username: credentials.username.clone(),
        password: credentials.password.clone(),
    });
    opts.stall_timeout = Some(config.git_stall_timeout());
    Ok(opts)
}

/// The HTTP(S)/`file://` sitemap reader and content fetcher for `config`.
pub fn http_sources(config: &AppConfig) -> (SitemapReader, HttpContentFetcher) {
    let timeout = config.http_timeout();
    let rewriter = ContentRewriter::new(&config.app_host_domain, &config.no_app_host_domain);
    (
        SitemapReader::new(timeout),
        HttpContentFetcher::new(timeout, rewriter),
    )
}

/// Run one sync under the instance lock.
///
/// The configuration is validated before anything is created. Lock
/// contention returns [`RunOutcome::Skipped`]. Any git failure aborts the run
/// before publishing; the lock is released on every path.
pub fn run_once(
    config: &AppConfig,
    sitemap: &dyn SitemapSource,
    fetcher: &dyn ContentFetcher,
) -> Result<RunOutcome, RunError> {
    config.validate()?;
    let lock_dir = &config.lock_file_directory;
    fs::create_dir_all(lock_dir).map_err(|e| io_err(lock_dir, e))?;
    let lock_path = paths::lock_path(lock_dir);

    let Some(lock) = InstanceLock::try_acquire(&lock_path)? else {
        tracing::info!(path = %lock_path.display(), "another instance is running; skipping");
        return Ok(RunOutcome::Skipped { lock_path });
    };

    let result = run_locked(config, sitemap, fetcher);
    if let Err(err) = lock.release() {
        tracing::warn!(error = %err, "failed to release instance lock");
    }
    result.map(RunOutcome::Completed)
}

fn run_locked(
    config: &AppConfig,
    sitemap: &dyn SitemapSource,
    fetcher: &dyn ContentFetcher,
) -> Result<RunReport, RunError> {
    let started_at = Utc::now();
    let engine = SyncEngine::new(engine_options(config)?);

    let pull = engine.pull()?;
    tracing::info!(
        head = pull.head_after.as_deref().unwrap_or("-"),
        conflicts = pull.remote_conflicts.len() + pull.stash_conflicts.len(),
        "pulled"
    );

    let mirror_opts = MirrorOptions::from_config(config, started_at);
    let mirror = mirror(&mirror_opts, sitemap, fetcher)?;

    let publish = engine.publish(&config.commit_message)?;
    match &publish.commit {
        Some(commit) => tracing::info!(commit = %commit, "published"),
        None => tracing::info!("nothing to commit"),
    }

    Ok(RunReport {
        started_at,
        finished_at: Utc::now(),
        pull,
        mirror,
        publish,
    })
}
