//! Hash-gated atomic writer and stale-file removal.
//!
//! ## `write_if_changed`
//!
//! 1. SHA-256 the new content.
//! 2. SHA-256 the file currently on disk, if any.
//! 3. Equal → leave the file alone (mtime untouched, nothing to stage).
//! 4. Write to `<path>.sitesync.tmp`.
//! 5. Rename to final path (atomic on POSIX).
//!
//! ## `remove_and_prune`
//!
//! Deletes a file, then removes every parent directory that became empty,
//! stopping at the working root.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{io_err, MirrorError};

/// Suffix of the temporary file used during a write.
pub const TMP_SUFFIX: &str = ".sitesync.tmp";

/// Outcome of an individual file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// File was written (content changed or did not previously exist).
    Written { path: PathBuf },
    /// File already holds exactly this content.
    Unchanged { path: PathBuf },
}

fn digest(content: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(content);
    hex::encode(h.finalize())
}

fn current_digest(path: &Path) -> Result<Option<String>, MirrorError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(digest(&bytes))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Write `content` to `path` unless the file already holds it.
pub fn write_if_changed(path: &Path, content: &[u8]) -> Result<WriteResult, MirrorError> {
    let tmp = PathBuf::from(format!("{}{TMP_SUFFIX}", path.display()));
    write_with_tmp(path, content, &tmp)
}

fn write_with_tmp(path: &Path, content: &[u8], tmp: &Path) -> Result<WriteResult, MirrorError> {
    let new_digest = digest(content);
    if current_digest(path)?.as_deref() == Some(new_digest.as_str()) {
        tracing::debug!("unchanged: {}", path.display());
        return Ok(WriteResult::Unchanged {
            path: path.to_path_buf(),
        });
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::info!("wrote: {}", path.display());
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

/// Delete `path` and prune emptied directories up to (not including) `root`.
///
/// Returns `false` when the file was already gone.
pub fn remove_and_prune(root: &Path, path: &Path) -> Result<bool, MirrorError> {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(io_err(path, e)),
    }
    tracing::info!("deleted: {}", path.display());

    let mut dir = path.parent();
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            break;
        }
        match std::fs::remove_dir(current) {
            Ok(()) => tracing::debug!("pruned empty directory: {}", current.display()),
            // Not empty, or already gone.
            Err(_) => break,
        }
        dir = current.parent();
    }
    Ok(true)
}
