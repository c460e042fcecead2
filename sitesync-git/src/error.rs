//! Error types for sitesync-git.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::SyncState;

#[derive(Debug, Error)]
pub enum GitError {
    /// The `git` executable could not be started.
    #[error("failed to execute {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// `git` ran and exited unsuccessfully.
    #[error("git command failed: {command}\nError: {stderr}")]
    Command {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("{path} is not a git working tree")]
    NotARepository { path: PathBuf },

    /// Paths still unmerged after conflict resolution.
    #[error("unresolved conflicts merging {target}: {}", paths.join(", "))]
    UnresolvedConflicts { target: String, paths: Vec<String> },

    /// A sync step failed; `state` is the state that was being entered.
    #[error("sync failed entering {state}: {source}")]
    Step {
        state: SyncState,
        #[source]
        source: Box<GitError>,
    },
}

impl GitError {
    /// State that failed, when this error came out of the sync engine.
    pub fn state(&self) -> Option<SyncState> {
        match self {
            GitError::Step { state, .. } => Some(*state),
            _ => None,
        }
    }
}
