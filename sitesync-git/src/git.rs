//! Thin wrapper around the `git` executable.
//!
//! Every invocation carries the same `-c` overrides (commit identity, no
//! signing, credential helper) and environment (no terminal prompts, stall
//! timeout). Credentials travel through environment variables read by an
//! inline credential helper, so they never show up in process arguments.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use crate::error::GitError;

const USERNAME_ENV: &str = "SITESYNC_GIT_USERNAME";
const PASSWORD_ENV: &str = "SITESYNC_GIT_PASSWORD";

/// Credential helper answering `get` from the two variables above.
const CREDENTIAL_HELPER: &str = "credential.helper=!f() { test \"$1\" = get && \
echo \"username=${SITESYNC_GIT_USERNAME}\" && \
echo \"password=${SITESYNC_GIT_PASSWORD}\"; }; f";

/// Transfers slower than this many bytes/second count as stalled.
const LOW_SPEED_LIMIT: &str = "1000";

/// A path left unmerged in the index, with the stages present for it.
///
/// Stage 1 is the common ancestor, 2 the current branch, 3 the branch being
/// merged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmergedPath {
    pub path: String,
    pub stages: Vec<u8>,
}

impl UnmergedPath {
    pub fn has_incoming(&self) -> bool {
        self.stages.contains(&3)
    }
}

/// `git` runner bound to one working tree.
#[derive(Debug, Clone)]
pub struct Git {
    repo: PathBuf,
    config: Vec<String>,
    env: Vec<(String, String)>,
}

impl Git {
    pub fn new(repo: &Path) -> Self {
        Self {
            repo: repo.to_path_buf(),
            config: vec!["commit.gpgsign=false".to_string()],
            env: vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())],
        }
    }

    pub fn with_identity(mut self, name: &str, email: &str) -> Self {
        self.config.push(format!("user.name={name}"));
        self.config.push(format!("user.email={email}"));
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        // An empty value first clears helpers configured elsewhere.
        self.config.push("credential.helper=".to_string());
        self.config.push(CREDENTIAL_HELPER.to_string());
        self.env.push((USERNAME_ENV.to_string(), username.to_string()));
        self.env.push((PASSWORD_ENV.to_string(), password.to_string()));
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout.as_secs().max(1).to_string();
        self.env
            .push(("GIT_HTTP_LOW_SPEED_LIMIT".to_string(), LOW_SPEED_LIMIT.to_string()));
        self.env.push(("GIT_HTTP_LOW_SPEED_TIME".to_string(), secs));
        self
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.repo).stdin(Stdio::null());
        for entry in &self.config {
            cmd.arg("-c").arg(entry);
        }
        cmd.args(args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }

    /// Run `git <args>` and return its output whatever the exit status.
    pub fn try_run(&self, args: &[&str]) -> Result<Output, GitError> {
        self.command(args).output().map_err(|source| GitError::Spawn {
            command: display_command(args),
            source,
        })
    }

    /// Run `git <args>`, failing on a non-zero exit status.
    pub fn run(&self, args: &[&str]) -> Result<Output, GitError> {
        let output = self.try_run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(GitError::Command {
                command: display_command(args),
                status: output.status.code(),
                stderr,
            });
        }
        tracing::trace!(command = %display_command(args), "git ok");
        Ok(output)
    }

    /// Trimmed stdout of a successful `git <args>`.
    pub fn stdout(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.run(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Whether `git <args>` exits zero.
    pub fn succeeds(&self, args: &[&str]) -> Result<bool, GitError> {
        Ok(self.try_run(args)?.status.success())
    }

    // ----- queries -----

    /// True when the bound directory is the root of a working tree.
    pub fn is_repository(&self) -> bool {
        self.repo.join(".git").exists()
    }

    /// Staged, unstaged or untracked changes are present.
    pub fn is_dirty(&self) -> Result<bool, GitError> {
        let status = self.stdout(&["status", "--porcelain", "--untracked-files=all"])?;
        Ok(!status.is_empty())
    }

    pub fn has_branch(&self, name: &str) -> Result<bool, GitError> {
        let reference = format!("refs/heads/{name}");
        self.succeeds(&["show-ref", "--verify", "--quiet", &reference])
    }

    pub fn merge_in_progress(&self) -> Result<bool, GitError> {
        self.succeeds(&["rev-parse", "-q", "--verify", "MERGE_HEAD"])
    }

    /// Commit id of `HEAD`, `None` on an unborn branch.
    pub fn head(&self) -> Result<Option<String>, GitError> {
        let output = self.try_run(&["rev-parse", "-q", "--verify", "HEAD"])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }

    /// Short name of the checked-out branch, `None` when detached.
    pub fn current_branch(&self) -> Result<Option<String>, GitError> {
        let output = self.try_run(&["symbolic-ref", "-q", "--short", "HEAD"])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }

    /// Local branches whose names start with `prefix`, sorted by name.
    pub fn branches_with_prefix(&self, prefix: &str) -> Result<Vec<String>, GitError> {
        let pattern = format!("refs/heads/{prefix}*");
        let listing = self.stdout(&["for-each-ref", "--format=%(refname:short)", &pattern])?;
        let mut branches: Vec<String> = listing
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        branches.sort();
        Ok(branches)
    }

    pub fn unmerged_paths(&self) -> Result<Vec<UnmergedPath>, GitError> {
        let output = self.run(&["ls-files", "-u", "-z"])?;
        Ok(parse_unmerged(&output.stdout))
    }
}

/// Parse `git ls-files -u -z` output (`<mode> <object> <stage>\t<path>\0`).
pub(crate) fn parse_unmerged(raw: &[u8]) -> Vec<UnmergedPath> {
    let text = String::from_utf8_lossy(raw);
    let mut by_path: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    for record in text.split('\0').filter(|r| !r.is_empty()) {
        let Some((meta, path)) = record.split_once('\t') else {
            continue;
        };
        let Some(stage) = meta
            .split_whitespace()
            .nth(2)
            .and_then(|s| s.parse::<u8>().ok())
        else {
            continue;
        };
        let stages = by_path.entry(path.to_string()).or_default();
        if !stages.contains(&stage) {
            stages.push(stage);
        }
    }
    by_path
        .into_iter()
        .map(|(path, mut stages)| {
            stages.sort_unstable();
            UnmergedPath { path, stages }
        })
        .collect()
}

fn display_command(args: &[&str]) -> String {
    format!("git {}", args.join(" "))
}
