//! Repository sync state machine.
//!
//! ```text
//! Start → Stashed? → Fetched → CheckedOut → Merging → {Merged | Resolved}
//!       → Reapplied? → Staged → {Committed | NothingToCommit} → Pushed → Done
//! ```
//!
//! ## Conflict policy
//!
//! Both merges run with the winning side as the incoming branch, so a single
//! rule covers them: `-X theirs`, then every path git could not merge takes
//! the incoming version, or is removed when the incoming side deleted it.
//!
//! 1. Merging the remote branch: the remote wins.
//! 2. Reapplying a stash branch: the stashed working tree wins.
//!
//! ## Stash emulation
//!
//! Uncommitted work (untracked files included) is committed onto a
//! `sitesync-stash-<UTC timestamp>` branch before fetching, and merged back
//! after the remote merge. If fetching or checking out fails, the stash is
//! turned back into uncommitted changes on the original branch. Stash
//! branches left behind by an interrupted run are merged back first, oldest
//! first, and deleted.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::error::GitError;
use crate::git::Git;

/// Branch name prefix for emulated stashes.
pub const STASH_PREFIX: &str = "sitesync-stash-";

/// Commit message used for stash commits.
pub const STASH_COMMIT_MESSAGE: &str = "Stashed changes";

pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_BRANCH: &str = "main";

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SyncState {
    Start,
    Stashed,
    Fetched,
    CheckedOut,
    Merging,
    Merged,
    Resolved,
    Reapplied,
    Staged,
    Committed,
    NothingToCommit,
    Pushed,
    Done,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Start => "start",
            SyncState::Stashed => "stashed",
            SyncState::Fetched => "fetched",
            SyncState::CheckedOut => "checked-out",
            SyncState::Merging => "merging",
            SyncState::Merged => "merged",
            SyncState::Resolved => "resolved",
            SyncState::Reapplied => "reapplied",
            SyncState::Staged => "staged",
            SyncState::Committed => "committed",
            SyncState::NothingToCommit => "nothing-to-commit",
            SyncState::Pushed => "pushed",
            SyncState::Done => "done",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Author and committer for every commit the engine makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

/// HTTP basic credentials for fetch and push.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for HttpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SyncEngineOptions {
    pub repo_path: PathBuf,
    pub remote: String,
    pub branch: String,
    pub identity: CommitIdentity,
    pub credentials: Option<HttpCredentials>,
    /// Abort network transfers that stall for this long.
    pub stall_timeout: Option<Duration>,
}

impl SyncEngineOptions {
    /// Options for `origin`/`main` with no credentials or stall timeout.
    pub fn new(repo_path: impl Into<PathBuf>, identity: CommitIdentity) -> Self {
        Self {
            repo_path: repo_path.into(),
            remote: DEFAULT_REMOTE.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            identity,
            credentials: None,
            stall_timeout: None,
        }
    }

    fn tracking_ref(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullReport {
    /// States reached, in order.
    pub trail: Vec<SyncState>,
    /// An interrupted merge was found and aborted.
    pub aborted_merge: bool,
    /// Stash branch created by this run.
    pub stash_branch: Option<String>,
    /// Stash branches from earlier runs merged back and deleted.
    pub recovered_stashes: Vec<String>,
    /// Paths resolved toward the remote while merging it.
    pub remote_conflicts: Vec<String>,
    /// Paths resolved toward stashed work while reapplying it.
    pub stash_conflicts: Vec<String>,
    pub head_before: Option<String>,
    pub head_after: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub trail: Vec<SyncState>,
    /// Commit created by this publish, if anything was staged.
    pub commit: Option<String>,
    pub pushed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pull: PullReport,
    pub publish: PublishReport,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SyncEngine {
    opts: SyncEngineOptions,
    git: Git,
}

impl SyncEngine {
    pub fn new(opts: SyncEngineOptions) -> Self {
        let mut git = Git::new(&opts.repo_path).with_identity(&opts.identity.name, &opts.identity.email);
        if let Some(creds) = &opts.credentials {
            git = git.with_credentials(&creds.username, &creds.password);
        }
        if let Some(timeout) = opts.stall_timeout {
            git = git.with_stall_timeout(timeout);
        }
        Self { opts, git }
    }

    pub fn options(&self) -> &SyncEngineOptions {
        &self.opts
    }

    /// Run `f` as the transition into `state`, tagging any failure with it.
    fn step<T>(
        &self,
        state: SyncState,
        f: impl FnOnce() -> Result<T, GitError>,
    ) -> Result<T, GitError> {
        tracing::debug!(state = %state, "entering");
        f().map_err(|source| {
            tracing::error!(state = %state, error = %source, "sync step failed");
            GitError::Step {
                state,
                source: Box::new(source),
            }
        })
    }

    /// Bring remote changes into the working tree, keeping local work.
    pub fn pull(&self) -> Result<PullReport, GitError> {
        let mut report = PullReport::default();

        let orphans = self.step(SyncState::Start, || self.start(&mut report))?;
        report.trail.push(SyncState::Start);

        let mut stashed_from = None;
        if self.step(SyncState::Stashed, || self.git.is_dirty())? {
            stashed_from = self.step(SyncState::Stashed, || self.git.current_branch())?;
            let stash = self.step(SyncState::Stashed, || self.stash())?;
            tracing::info!(branch = %stash, "stashed local changes");
            report.stash_branch = Some(stash);
            report.trail.push(SyncState::Stashed);
        }

        if let Err(err) = self.fetch_and_checkout(&mut report) {
            if let Some(stash) = &report.stash_branch {
                self.unstash_quietly(stash, stashed_from.as_deref());
            }
            return Err(err);
        }

        report.trail.push(SyncState::Merging);
        let target = self.opts.tracking_ref();
        let clean = self.step(SyncState::Merging, || self.merge(&target))?;
        if clean {
            report.trail.push(SyncState::Merged);
        } else {
            report.remote_conflicts = self.step(SyncState::Resolved, || {
                self.resolve_and_conclude(&target)
            })?;
            tracing::info!(
                paths = report.remote_conflicts.len(),
                "resolved remote conflicts toward remote"
            );
            report.trail.push(SyncState::Resolved);
        }

        let mut stashes = orphans.clone();
        stashes.extend(report.stash_branch.iter().cloned());
        if !stashes.is_empty() {
            for stash in &stashes {
                let conflicts = self.step(SyncState::Reapplied, || self.reapply(stash))?;
                report.stash_conflicts.extend(conflicts);
            }
            report.recovered_stashes = orphans;
            report.trail.push(SyncState::Reapplied);
        }

        report.head_after = self.git.head()?;
        Ok(report)
    }

    /// Stage everything, commit if anything changed, and force-push.
    pub fn publish(&self, message: &str) -> Result<PublishReport, GitError> {
        let mut report = PublishReport::default();

        self.step(SyncState::Staged, || self.git.run(&["add", "-A"]).map(|_| ()))?;
        report.trail.push(SyncState::Staged);

        let commit = self.step(SyncState::Committed, || self.commit_if_changed(message))?;
        match &commit {
            Some(sha) => {
                tracing::info!(commit = %sha, "committed changes");
                report.trail.push(SyncState::Committed);
            }
            None => {
                tracing::info!("nothing to commit");
                report.trail.push(SyncState::NothingToCommit);
            }
        }
        report.commit = commit;

        self.step(SyncState::Pushed, || self.push())?;
        report.pushed = true;
        report.trail.push(SyncState::Pushed);

        report.trail.push(SyncState::Done);
        Ok(report)
    }

    /// [`pull`](Self::pull) then [`publish`](Self::publish).
    pub fn sync(&self, message: &str) -> Result<SyncReport, GitError> {
        let pull = self.pull()?;
        let publish = self.publish(message)?;
        Ok(SyncReport { pull, publish })
    }

    // ----- transitions -----

    /// Validate the tree, clear crash leftovers and list orphan stashes.
    fn start(&self, report: &mut PullReport) -> Result<Vec<String>, GitError> {
        if !self.git.is_repository() {
            return Err(GitError::NotARepository {
                path: self.opts.repo_path.clone(),
            });
        }

        if self.git.merge_in_progress()? {
            tracing::warn!("aborting merge left by an interrupted run");
            self.git.run(&["merge", "--abort"])?;
            report.aborted_merge = true;
        }

        // Interrupted between creating a stash branch and committing to it.
        if let Some(current) = self.git.current_branch()? {
            if current.starts_with(STASH_PREFIX) && self.git.is_dirty()? {
                tracing::warn!(branch = %current, "completing interrupted stash");
                self.commit_stash()?;
            }
        }

        report.head_before = self.git.head()?;
        let orphans = self.git.branches_with_prefix(STASH_PREFIX)?;
        if !orphans.is_empty() {
            tracing::warn!(count = orphans.len(), "found stash branches from an earlier run");
        }
        Ok(orphans)
    }

    fn fetch_and_checkout(&self, report: &mut PullReport) -> Result<(), GitError> {
        self.step(SyncState::Fetched, || self.fetch())?;
        report.trail.push(SyncState::Fetched);

        self.step(SyncState::CheckedOut, || self.checkout_primary())?;
        report.trail.push(SyncState::CheckedOut);
        Ok(())
    }

    /// Undo a stash made by this run: uncommitted changes back on the branch
    /// they came from, stash branch deleted.
    ///
    /// Best effort. Whatever is left behind is recovered as an orphan by the
    /// next run.
    fn unstash_quietly(&self, stash: &str, previous: Option<&str>) {
        let restore = || -> Result<bool, GitError> {
            if self.git.current_branch()?.as_deref() != Some(stash) {
                return Ok(false);
            }
            self.git.run(&["reset", "-q", "--mixed", "HEAD~1"])?;
            match previous {
                Some(branch) => self.git.run(&["checkout", "-q", branch])?,
                None => self.git.run(&["checkout", "-q", "--detach"])?,
            };
            self.git.run(&["branch", "-q", "-D", stash])?;
            Ok(true)
        };
        match restore() {
            Ok(true) => tracing::info!(branch = %stash, "restored stashed changes after failure"),
            Ok(false) => tracing::warn!(branch = %stash, "stash branch left for the next run"),
            Err(err) => {
                tracing::warn!(branch = %stash, error = %err, "stash branch left for the next run")
            }
        }
    }

    fn stash(&self) -> Result<String, GitError> {
        let name = self.unique_stash_name()?;
        self.git.run(&["checkout", "-q", "-b", &name])?;
        self.commit_stash()?;
        Ok(name)
    }

    fn commit_stash(&self) -> Result<(), GitError> {
        self.git.run(&["add", "-A"])?;
        self.git
            .run(&["commit", "-q", "--no-verify", "-m", STASH_COMMIT_MESSAGE])?;
        Ok(())
    }

    fn unique_stash_name(&self) -> Result<String, GitError> {
        let base = format!("{STASH_PREFIX}{}", Utc::now().format("%Y%m%d%H%M%S"));
        if !self.git.has_branch(&base)? {
            return Ok(base);
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}-{n}");
            if !self.git.has_branch(&candidate)? {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    fn fetch(&self) -> Result<(), GitError> {
        let refspec = format!(
            "+refs/heads/{branch}:refs/remotes/{remote}/{branch}",
            branch = self.opts.branch,
            remote = self.opts.remote,
        );
        tracing::info!(remote = %self.opts.remote, branch = %self.opts.branch, "fetching");
        self.git
            .run(&["fetch", "--no-tags", &self.opts.remote, &refspec])?;
        Ok(())
    }

    fn checkout_primary(&self) -> Result<(), GitError> {
        let branch = self.opts.branch.as_str();
        if self.git.has_branch(branch)? {
            self.git.run(&["checkout", "-q", branch])?;
        } else {
            let tracking = self.opts.tracking_ref();
            self.git.run(&["checkout", "-q", "-b", branch, &tracking])?;
        }
        Ok(())
    }

    /// Merge `target` with the incoming side preferred. `Ok(false)` means
    /// conflicts were left for [`Self::resolve_and_conclude`].
    fn merge(&self, target: &str) -> Result<bool, GitError> {
        tracing::info!(target = %target, "merging");
        let args = ["merge", "--no-edit", "--no-verify", "-X", "theirs", target];
        let output = self.git.try_run(&args)?;
        if output.status.success() {
            return Ok(true);
        }
        if self.git.merge_in_progress()? {
            return Ok(false);
        }
        Err(GitError::Command {
            command: format!("git {}", args.join(" ")),
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Resolve every unmerged path toward the incoming side, then commit the
    /// merge.
    ///
    /// On failure the merge is aborted so no half-merged index survives.
    fn resolve_and_conclude(&self, target: &str) -> Result<Vec<String>, GitError> {
        let result = self.resolve(target).and_then(|paths| {
            self.git.run(&["commit", "-q", "--no-edit", "--no-verify"])?;
            Ok(paths)
        });
        if result.is_err() {
            self.abort_merge_quietly();
        }
        result
    }

    /// Incoming version when it exists, otherwise the path is removed.
    fn resolve(&self, target: &str) -> Result<Vec<String>, GitError> {
        let unmerged = self.git.unmerged_paths()?;
        let mut resolved = Vec::with_capacity(unmerged.len());
        for entry in &unmerged {
            let path = entry.path.as_str();
            if entry.has_incoming() {
                tracing::info!(path = %path, target = %target, "conflict: taking incoming version");
                self.git.run(&["checkout", "--theirs", "--", path])?;
                self.git.run(&["add", "--", path])?;
            } else {
                tracing::info!(path = %path, target = %target, "conflict: incoming side deleted path");
                self.git.run(&["rm", "-q", "-f", "--", path])?;
            }
            resolved.push(entry.path.clone());
        }

        let remaining = self.git.unmerged_paths()?;
        if !remaining.is_empty() {
            return Err(GitError::UnresolvedConflicts {
                target: target.to_string(),
                paths: remaining.into_iter().map(|p| p.path).collect(),
            });
        }
        Ok(resolved)
    }

    /// Merge a stash branch back with its content winning, then delete it.
    fn reapply(&self, stash: &str) -> Result<Vec<String>, GitError> {
        tracing::info!(branch = %stash, "reapplying stashed changes");
        let conflicts = if self.merge(stash)? {
            Vec::new()
        } else {
            self.resolve_and_conclude(stash)?
        };
        self.git.run(&["branch", "-q", "-D", stash])?;
        Ok(conflicts)
    }

    fn commit_if_changed(&self, message: &str) -> Result<Option<String>, GitError> {
        if !self.git.is_dirty()? {
            return Ok(None);
        }
        self.git.run(&["commit", "-q", "--no-verify", "-m", message])?;
        self.git.head()
    }

    fn push(&self) -> Result<(), GitError> {
        let refspec = format!("+refs/heads/{0}:refs/heads/{0}", self.opts.branch);
        tracing::info!(remote = %self.opts.remote, branch = %self.opts.branch, "pushing");
        self.git.run(&["push", "-q", &self.opts.remote, &refspec])?;
        Ok(())
    }

    fn abort_merge_quietly(&self) {
        match self.git.merge_in_progress() {
            Ok(true) => {
                if let Err(err) = self.git.run(&["merge", "--abort"]) {
                    tracing::warn!(error = %err, "failed to abort merge");
                }
            }
            Ok(false) => {}
            Err(err) => tracing::warn!(error = %err, "could not inspect merge state"),
        }
    }
}
