//! Single-instance guard around a run.
//!
//! The lock is an OS advisory exclusive lock (`flock` on unix) on a file in
//! `LockFileDirectory`. Contention is not an error: [`InstanceLock::try_acquire`]
//! returns `Ok(None)` and the caller skips the run.
//!
//! If the process is killed without cleanup the OS drops the advisory lock
//! and the stale file is simply reused by the next acquire.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs4::FileExt;

use crate::error::{lock_io_err, LockError};

/// Attempts made when a concurrent release unlinks the file we just locked.
const ACQUIRE_ATTEMPTS: usize = 3;

/// Held exclusive lock. Released on [`InstanceLock::release`] or drop.
#[derive(Debug)]
pub struct InstanceLock {
    file: Option<File>,
    path: PathBuf,
}

impl InstanceLock {
    /// Take the lock at `path` without blocking.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, LockError> {
        for _ in 0..ACQUIRE_ATTEMPTS {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .map_err(|e| lock_io_err(path, e))?;

            match file.try_lock_exclusive() {
                Ok(()) => {}
                Err(err) if is_contended(&err) => {
                    tracing::debug!(path = %path.display(), "lock held by another instance");
                    return Ok(None);
                }
                Err(err) => return Err(lock_io_err(path, err)),
            }

            // The previous holder may have deleted the file between our open
            // and our lock; that inode is no longer the lock.
            if !names_locked_file(&file, path).map_err(|e| lock_io_err(path, e))? {
                let _ = file.unlock();
                continue;
            }

            let mut lock = Self {
                file: Some(file),
                path: path.to_path_buf(),
            };
            lock.write_owner().map_err(|e| lock_io_err(path, e))?;
            tracing::debug!(path = %path.display(), "lock acquired");
            return Ok(Some(lock));
        }
        Ok(None)
    }

    /// Whether another handle currently holds the lock at `path`.
    pub fn is_held(path: &Path) -> Result<bool, LockError> {
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(lock_io_err(path, err)),
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = file.unlock();
                Ok(false)
            }
            Err(err) if is_contended(&err) => Ok(true),
            Err(err) => Err(lock_io_err(path, err)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the lock file, then drop the OS lock.
    pub fn release(mut self) -> Result<(), LockError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), LockError> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        let removed = match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(lock_io_err(&self.path, err)),
        };
        let unlocked = file.unlock().map_err(|e| lock_io_err(&self.path, e));
        tracing::debug!(path = %self.path.display(), "lock released");
        removed.and(unlocked)
    }

    fn write_owner(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.set_len(0)?;
            writeln!(file, "{}", std::process::id())?;
            file.flush()?;
        }
        Ok(())
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(err) = self.release_inner() {
            tracing::warn!(error = %err, "failed to release instance lock");
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    // ERROR_LOCK_VIOLATION on Windows.
    err.kind() == io::ErrorKind::WouldBlock || (cfg!(windows) && err.raw_os_error() == Some(33))
}

#[cfg(unix)]
fn names_locked_file(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(on_disk) => Ok(held.dev() == on_disk.dev() && held.ino() == on_disk.ino()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(not(unix))]
fn names_locked_file(_file: &File, _path: &Path) -> io::Result<bool> {
    // Open files cannot be unlinked here, so the path always names our file.
    Ok(true)
}
