//! # sitesync-git
//!
//! Drives the `git` executable to keep a working tree and one remote branch
//! in step. [`SyncEngine::pull`] brings remote changes in while preserving
//! uncommitted local work; [`SyncEngine::publish`] commits and force-pushes.

pub mod engine;
pub mod error;
pub mod git;

pub use engine::{
    CommitIdentity, HttpCredentials, PublishReport, PullReport, SyncEngine, SyncEngineOptions,
    SyncReport, SyncState, STASH_PREFIX,
};
pub use error::GitError;
