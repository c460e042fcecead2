//! Sync engine scenarios against real repositories.
//!
//! Each test builds a bare `origin`, a second clone standing in for other
//! writers (`other`), and the clone the engine drives (`local`).

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use sitesync_git::{
    CommitIdentity, GitError, SyncEngine, SyncEngineOptions, SyncState, STASH_PREFIX,
};
use tempfile::TempDir;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args([
            "-c",
            "user.name=Test User",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

struct Fixture {
    _tmp: TempDir,
    origin: PathBuf,
    local: PathBuf,
    other: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let origin = tmp.path().join("origin.git");
        let other = tmp.path().join("other");
        let local = tmp.path().join("local");
        fs::create_dir_all(&origin).unwrap();
        fs::create_dir_all(&other).unwrap();

        git(&origin, &["init", "-q", "--bare", "-b", "main"]);

        git(&other, &["init", "-q", "-b", "main"]);
        fs::write(other.join("a.txt"), "line one\n").unwrap();
        fs::write(other.join("b.txt"), "bee\n").unwrap();
        git(&other, &["add", "-A"]);
        git(&other, &["commit", "-q", "-m", "initial"]);
        git(&other, &["remote", "add", "origin", origin.to_str().unwrap()]);
        git(&other, &["push", "-q", "origin", "main"]);

        git(
            tmp.path(),
            &["clone", "-q", origin.to_str().unwrap(), local.to_str().unwrap()],
        );

        Self {
            _tmp: tmp,
            origin,
            local,
            other,
        }
    }

    fn engine(&self) -> SyncEngine {
        SyncEngine::new(SyncEngineOptions::new(
            &self.local,
            CommitIdentity {
                name: "sitesync-bot".into(),
                email: "bot@example.com".into(),
            },
        ))
    }

    /// Commit `content` to `file` in `other` and push it.
    fn remote_commit(&self, file: &str, content: Option<&str>) {
        match content {
            Some(content) => fs::write(self.other.join(file), content).unwrap(),
            None => {
                fs::remove_file(self.other.join(file)).unwrap();
            }
        }
        git(&self.other, &["add", "-A"]);
        git(&self.other, &["commit", "-q", "-m", &format!("remote edit of {file}")]);
        git(&self.other, &["push", "-q", "origin", "main"]);
    }

    fn local_commit(&self, file: &str, content: &str) {
        fs::write(self.local.join(file), content).unwrap();
        git(&self.local, &["add", "-A"]);
        git(&self.local, &["commit", "-q", "-m", &format!("local edit of {file}")]);
    }

    fn read_local(&self, file: &str) -> String {
        fs::read_to_string(self.local.join(file)).unwrap()
    }

    fn stash_branches(&self) -> String {
        git(
            &self.local,
            &["branch", "--list", &format!("{STASH_PREFIX}*")],
        )
    }

    fn origin_subject(&self) -> String {
        git(&self.origin, &["log", "-1", "--format=%s", "main"])
    }
}

// ---------------------------------------------------------------------------
// 1. Pull
// ---------------------------------------------------------------------------

#[test]
fn pull_brings_in_remote_changes() {
    let fx = Fixture::new();
    fx.remote_commit("c.txt", Some("new from remote\n"));

    let report = fx.engine().pull().expect("pull");
    assert_eq!(fx.read_local("c.txt"), "new from remote\n");
    assert_eq!(
        report.trail,
        vec![
            SyncState::Start,
            SyncState::Fetched,
            SyncState::CheckedOut,
            SyncState::Merging,
            SyncState::Merged,
        ]
    );
    assert!(report.stash_branch.is_none());
    assert_ne!(report.head_before, report.head_after);
}

#[test]
fn remote_wins_over_committed_local_edit() {
    let fx = Fixture::new();
    fx.local_commit("a.txt", "local version\n");
    fx.remote_commit("a.txt", Some("remote version\n"));

    fx.engine().pull().expect("pull");
    assert_eq!(fx.read_local("a.txt"), "remote version\n");
}

#[test]
fn remote_delete_beats_local_modification() {
    let fx = Fixture::new();
    fx.local_commit("a.txt", "local version\n");
    fx.remote_commit("a.txt", None);

    let report = fx.engine().pull().expect("pull");
    assert!(!fx.local.join("a.txt").exists());
    assert_eq!(report.remote_conflicts, vec!["a.txt".to_string()]);
    assert!(report.trail.contains(&SyncState::Resolved));
    assert!(git(&fx.local, &["status", "--porcelain"]).is_empty());
}

#[test]
fn uncommitted_local_edit_survives_remote_changes() {
    let fx = Fixture::new();
    fs::write(fx.local.join("b.txt"), "local bee\n").unwrap();
    fs::write(fx.local.join("untracked.txt"), "mine\n").unwrap();
    fx.remote_commit("a.txt", Some("remote version\n"));

    let report = fx.engine().pull().expect("pull");
    assert_eq!(fx.read_local("a.txt"), "remote version\n");
    assert_eq!(fx.read_local("b.txt"), "local bee\n");
    assert_eq!(fx.read_local("untracked.txt"), "mine\n");

    let stash = report.stash_branch.expect("stash branch");
    assert!(stash.starts_with(STASH_PREFIX));
    assert!(report.trail.contains(&SyncState::Stashed));
    assert!(report.trail.contains(&SyncState::Reapplied));
    assert!(fx.stash_branches().is_empty(), "stash branch should be deleted");
    assert_eq!(git(&fx.local, &["symbolic-ref", "--short", "HEAD"]), "main");
}

#[test]
fn stashed_edit_wins_conflict_with_remote() {
    let fx = Fixture::new();
    fs::write(fx.local.join("a.txt"), "local edit\n").unwrap();
    fx.remote_commit("a.txt", Some("remote edit\n"));

    fx.engine().pull().expect("pull");
    assert_eq!(fx.read_local("a.txt"), "local edit\n");
}

#[test]
fn orphan_stash_from_crashed_run_is_recovered() {
    let fx = Fixture::new();
    let orphan = format!("{STASH_PREFIX}20000101000000");
    git(&fx.local, &["checkout", "-q", "-b", &orphan]);
    fs::write(fx.local.join("orphan.txt"), "left behind\n").unwrap();
    git(&fx.local, &["add", "-A"]);
    git(&fx.local, &["commit", "-q", "-m", "Stashed changes"]);
    git(&fx.local, &["checkout", "-q", "main"]);

    let report = fx.engine().pull().expect("pull");
    assert_eq!(report.recovered_stashes, vec![orphan]);
    assert_eq!(fx.read_local("orphan.txt"), "left behind\n");
    assert!(fx.stash_branches().is_empty());
}

#[test]
fn interrupted_stash_is_completed_and_reapplied() {
    let fx = Fixture::new();
    let orphan = format!("{STASH_PREFIX}20000101000000");
    git(&fx.local, &["checkout", "-q", "-b", &orphan]);
    fs::write(fx.local.join("b.txt"), "half stashed\n").unwrap();
    fx.remote_commit("c.txt", Some("remote\n"));

    let report = fx.engine().pull().expect("pull");
    assert_eq!(report.recovered_stashes, vec![orphan]);
    assert_eq!(fx.read_local("b.txt"), "half stashed\n");
    assert_eq!(fx.read_local("c.txt"), "remote\n");
    assert_eq!(git(&fx.local, &["symbolic-ref", "--short", "HEAD"]), "main");
}

#[test]
fn interrupted_merge_is_aborted_before_syncing() {
    let fx = Fixture::new();
    fx.local_commit("a.txt", "local version\n");
    fx.remote_commit("a.txt", Some("remote version\n"));
    git(&fx.local, &["fetch", "-q", "origin"]);
    let merge = Command::new("git")
        .current_dir(&fx.local)
        .args(["-c", "user.name=T", "-c", "user.email=t@example.com"])
        .args(["merge", "--no-edit", "origin/main"])
        .output()
        .unwrap();
    assert!(!merge.status.success(), "merge should conflict");

    let report = fx.engine().pull().expect("pull");
    assert!(report.aborted_merge);
    assert_eq!(fx.read_local("a.txt"), "remote version\n");
}

// ---------------------------------------------------------------------------
// 2. Publish
// ---------------------------------------------------------------------------

#[test]
fn publish_commits_and_pushes_changes() {
    let fx = Fixture::new();
    let engine = fx.engine();
    engine.pull().expect("pull");
    fs::write(fx.local.join("page.html"), "<p>new</p>").unwrap();

    let report = engine.publish("Updated files from sitemap").expect("publish");
    assert!(report.commit.is_some());
    assert!(report.pushed);
    assert_eq!(
        report.trail,
        vec![
            SyncState::Staged,
            SyncState::Committed,
            SyncState::Pushed,
            SyncState::Done,
        ]
    );
    assert_eq!(fx.origin_subject(), "Updated files from sitemap");
    let author = git(&fx.origin, &["log", "-1", "--format=%an <%ae>", "main"]);
    assert_eq!(author, "sitesync-bot <bot@example.com>");
}

#[test]
fn clean_tree_publishes_nothing_to_commit() {
    let fx = Fixture::new();
    let report = fx.engine().sync("unused message").expect("sync");
    assert!(report.publish.commit.is_none());
    assert!(report.publish.trail.contains(&SyncState::NothingToCommit));
    assert!(report.publish.pushed);
    assert_eq!(fx.origin_subject(), "initial");
}

#[test]
fn local_and_remote_converge_after_sync() {
    let fx = Fixture::new();
    fs::write(fx.local.join("b.txt"), "local bee\n").unwrap();
    fx.remote_commit("a.txt", Some("remote version\n"));

    fx.engine().sync("sync").expect("sync");
    let local_head = git(&fx.local, &["rev-parse", "HEAD"]);
    let origin_head = git(&fx.origin, &["rev-parse", "main"]);
    assert_eq!(local_head, origin_head);

    git(&fx.other, &["pull", "-q", "--no-rebase", "origin", "main"]);
    assert_eq!(
        fs::read_to_string(fx.other.join("b.txt")).unwrap(),
        "local bee\n"
    );
}

// ---------------------------------------------------------------------------
// 3. Failures
// ---------------------------------------------------------------------------

#[test]
fn fetch_failure_names_the_fetch_step() {
    let fx = Fixture::new();
    git(&fx.local, &["remote", "set-url", "origin", "/nonexistent/remote.git"]);

    let err = fx.engine().sync("never").unwrap_err();
    assert_eq!(err.state(), Some(SyncState::Fetched), "got: {err}");
    assert!(matches!(err, GitError::Step { .. }));
    assert_eq!(fx.origin_subject(), "initial");
}

#[test]
fn non_repository_fails_at_start() {
    let dir = TempDir::new().unwrap();
    let engine = SyncEngine::new(SyncEngineOptions::new(
        dir.path(),
        CommitIdentity {
            name: "bot".into(),
            email: "bot@example.com".into(),
        },
    ));
    let err = engine.pull().unwrap_err();
    match err {
        GitError::Step { state, source } => {
            assert_eq!(state, SyncState::Start);
            assert!(matches!(*source, GitError::NotARepository { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn fetch_failure_puts_stashed_edits_back_on_the_branch() {
    let fx = Fixture::new();
    fs::write(fx.local.join("b.txt"), "local bee\n").unwrap();
    fs::write(fx.local.join("untracked.txt"), "mine\n").unwrap();
    let url = git(&fx.local, &["remote", "get-url", "origin"]);
    git(&fx.local, &["remote", "set-url", "origin", "/nonexistent/remote.git"]);

    let err = fx.engine().pull().unwrap_err();
    assert_eq!(err.state(), Some(SyncState::Fetched), "got: {err}");
    assert_eq!(git(&fx.local, &["symbolic-ref", "--short", "HEAD"]), "main");
    assert!(fx.stash_branches().is_empty());
    assert_eq!(fx.read_local("b.txt"), "local bee\n");
    assert_eq!(fx.read_local("untracked.txt"), "mine\n");
    let status = git(&fx.local, &["status", "--porcelain"]);
    assert!(status.contains("b.txt"), "{status}");
    assert!(status.contains("untracked.txt"), "{status}");
    assert_eq!(git(&fx.local, &["log", "-1", "--format=%s"]), "initial");

    git(&fx.local, &["remote", "set-url", "origin", &url]);
    fx.remote_commit("a.txt", Some("remote version\n"));
    fx.engine().pull().expect("pull after the remote is back");
    assert_eq!(fx.read_local("a.txt"), "remote version\n");
    assert_eq!(fx.read_local("b.txt"), "local bee\n");
    assert_eq!(git(&fx.local, &["symbolic-ref", "--short", "HEAD"]), "main");
}

#[test]
#[cfg(unix)]
fn failing_merge_hook_does_not_block_pull() {
    use std::os::unix::fs::PermissionsExt;

    let fx = Fixture::new();
    fx.local_commit("c.txt", "local only\n");
    fx.remote_commit("a.txt", Some("remote version\n"));

    let hook = fx.local.join(".git/hooks/pre-merge-commit");
    fs::create_dir_all(hook.parent().unwrap()).unwrap();
    fs::write(&hook, "#!/bin/sh\nexit 1\n").unwrap();
    fs::set_permissions(&hook, fs::Permissions::from_mode(0o755)).unwrap();

    let report = fx.engine().pull().expect("pull");
    assert!(report.trail.contains(&SyncState::Merged));
    assert_eq!(fx.read_local("a.txt"), "remote version\n");
    assert_eq!(fx.read_local("c.txt"), "local only\n");
}
