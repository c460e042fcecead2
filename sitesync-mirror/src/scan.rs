//! Local tree scan.

use std::path::Path;

use walkdir::WalkDir;

use sitesync_core::types::LocalFileRecord;

use crate::error::{io_err, MirrorError};

/// Repository metadata directory; never listed.
pub const GIT_DIR: &str = ".git";

/// List every regular file under `root`, skipping `.git` at any depth.
///
/// Symlinks are not followed. The result is sorted by canonical key.
pub fn scan_tree(root: &Path) -> Result<Vec<LocalFileRecord>, MirrorError> {
    let mut records = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != GIT_DIR)
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop")
                });
            io_err(path, source)
        })?;
        if entry.file_type().is_file() {
            records.push(LocalFileRecord::new(root, entry.path()));
        }
    }
    records.sort();
    tracing::debug!(root = %root.display(), files = records.len(), "scanned working tree");
    Ok(records)
}
