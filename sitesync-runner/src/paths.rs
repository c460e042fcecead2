use std::path::{Path, PathBuf};

/// Name of the lock file inside `LockFileDirectory`.
pub const LOCK_FILE_NAME: &str = "app.lock";

pub fn lock_path(lock_dir: &Path) -> PathBuf {
    lock_dir.join(LOCK_FILE_NAME)
}
