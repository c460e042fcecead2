//! Domain types shared by the mirror, git and runner crates.
//!
//! Filesystem paths are always `PathBuf`; comparison between paths goes
//! through [`LocalFileRecord::key`], never through raw `Path` equality.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// One `<url>` entry read from a sitemap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryEntry {
    pub url: String,
    pub last_modified: Option<DateTime<Utc>>,
}

impl DiscoveryEntry {
    pub fn new(url: impl Into<String>, last_modified: Option<DateTime<Utc>>) -> Self {
        Self {
            url: url.into(),
            last_modified,
        }
    }
}

// ---------------------------------------------------------------------------
// Local files
// ---------------------------------------------------------------------------

/// A file under the working root, paired with its canonical comparison key.
///
/// The key is the absolute, lexically normalised path with `/` separators,
/// no trailing separator, and case folded. Equality, hashing and ordering
/// only look at the key, so `Docs/A.html` and `docs/a.html` are the same file.
#[derive(Debug, Clone, Serialize)]
pub struct LocalFileRecord {
    path: PathBuf,
    key: String,
}

impl LocalFileRecord {
    /// Build a record for `path`, joining it onto `root` when relative.
    pub fn new(root: &Path, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        let path = normalize_lexically(&absolute);
        let key = canonical_key(&path);
        Self { path, key }
    }

    /// Absolute path on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Canonical comparison key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Path relative to `root`, or the absolute path when outside it.
    pub fn relative_to(&self, root: &Path) -> PathBuf {
        let root = normalize_lexically(root);
        self.path
            .strip_prefix(&root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| self.path.clone())
    }

    /// True when this record is `other` or lies beneath it.
    pub fn is_within(&self, other: &LocalFileRecord) -> bool {
        self.key == other.key
            || (self.key.starts_with(&other.key)
                && self.key[other.key.len()..].starts_with('/'))
    }
}

impl PartialEq for LocalFileRecord {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for LocalFileRecord {}

impl Hash for LocalFileRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for LocalFileRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalFileRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for LocalFileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.path.display().fmt(f)
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
///
/// The files being compared may not exist yet, so `fs::canonicalize` is not
/// an option here.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn canonical_key(path: &Path) -> String {
    let unified = path.to_string_lossy().replace('\\', "/");
    let trimmed = unified.trim_end_matches('/');
    let trimmed = if trimmed.is_empty() { "/" } else { trimmed };
    trimmed.to_lowercase()
}

// ---------------------------------------------------------------------------
// Exclusions
// ---------------------------------------------------------------------------

/// Paths under the working root that must never be deleted.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    entries: BTreeSet<LocalFileRecord>,
}

impl ExclusionSet {
    /// Build from paths relative to `root` (absolute paths are kept as-is).
    pub fn new<I, P>(root: &Path, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let entries = paths
            .into_iter()
            .map(|p| LocalFileRecord::new(root, p))
            .collect();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// True when `record` is an excluded path or lives under an excluded directory.
    pub fn excludes(&self, record: &LocalFileRecord) -> bool {
        self.entries.iter().any(|entry| record.is_within(entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalFileRecord> {
        self.entries.iter()
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Identity and HTTP credentials used for every fetch, commit and push.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GitCredentials {
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl GitCredentials {
    /// Commit e-mail; falls back to a no-reply address derived from the username.
    pub fn email_or_default(&self) -> String {
        match self.email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() => email.to_string(),
            _ => format!("{}@users.noreply.sitesync", self.username),
        }
    }
}

impl fmt::Debug for GitCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn root() -> PathBuf {
        PathBuf::from("/srv/site")
    }

    #[rstest]
    #[case("a.html", "a.html")]
    #[case("A.HTML", "a.html")]
    #[case("docs/", "docs")]
    #[case("./docs/intro.html", "docs/intro.html")]
    #[case("docs/../about.html", "about.html")]
    fn equal_after_canonicalization(#[case] left: &str, #[case] right: &str) {
        let l = LocalFileRecord::new(&root(), left);
        let r = LocalFileRecord::new(&root(), right);
        assert_eq!(l, r, "{left} vs {right}");
        assert_eq!(l.key(), r.key());
    }

    #[test]
    fn relative_and_absolute_forms_match() {
        let rel = LocalFileRecord::new(&root(), "img/logo.png");
        let abs = LocalFileRecord::new(&root(), "/srv/site/img/logo.png");
        assert_eq!(rel, abs);
        assert_eq!(rel.relative_to(&root()), PathBuf::from("img/logo.png"));
    }

    #[test]
    fn different_files_do_not_match() {
        let a = LocalFileRecord::new(&root(), "a.html");
        let b = LocalFileRecord::new(&root(), "b.html");
        assert_ne!(a, b);
    }

    #[test]
    fn exclusion_covers_directory_descendants_only() {
        let set = ExclusionSet::new(&root(), ["assets", "README.md"]);
        assert!(set.excludes(&LocalFileRecord::new(&root(), "assets/site.css")));
        assert!(set.excludes(&LocalFileRecord::new(&root(), "readme.md")));
        assert!(!set.excludes(&LocalFileRecord::new(&root(), "assets-old/site.css")));
        assert!(!set.excludes(&LocalFileRecord::new(&root(), "index.html")));
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = GitCredentials {
            username: "bot".into(),
            password: "hunter2".into(),
            email: None,
        };
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
        assert_eq!(creds.email_or_default(), "bot@users.noreply.sitesync");
    }
}
