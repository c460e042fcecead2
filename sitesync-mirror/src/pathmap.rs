//! URL → relative file path mapping.
//!
//! Only the URL path takes part; query and fragment are ignored.
//!
//! | URL                              | path               |
//! |----------------------------------|--------------------|
//! | `https://host/`                  | `index.html`       |
//! | `https://host/about`             | `about.html`       |
//! | `https://host/docs/intro/`       | `docs/intro.html`  |
//! | `https://host/img/logo.png?v=2`  | `img/logo.png`     |
//!
//! A final segment that already contains a dot is taken to have an
//! extension, so `https://host/v1.2/` maps to `v1.2` rather than
//! `v1.2.html`. Percent-encoded characters are kept as they appear in the URL.

use std::path::{Path, PathBuf};

use url::Url;

use crate::error::MirrorError;

/// File used for the site root.
pub const INDEX_FILE: &str = "index.html";

/// Extension appended to extensionless pages.
pub const PAGE_EXTENSION: &str = "html";

/// Map `url` to a path relative to the working root.
pub fn map_url(url: &str) -> Result<PathBuf, MirrorError> {
    let parsed = Url::parse(url).map_err(|e| invalid(url, e.to_string()))?;
    if parsed.cannot_be_a_base() {
        return Err(invalid(url, "URL has no hierarchical path"));
    }

    let segments: Vec<&str> = parsed
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.is_empty() {
        return Ok(PathBuf::from(INDEX_FILE));
    }

    let mut path = PathBuf::new();
    for segment in &segments {
        if matches!(*segment, "." | "..") || segment.contains('\\') {
            return Err(invalid(url, "path escapes the working root"));
        }
        path.push(segment);
    }

    if Path::new(segments[segments.len() - 1]).extension().is_none() {
        path.set_extension(PAGE_EXTENSION);
    }
    Ok(path)
}

fn invalid(url: &str, reason: impl Into<String>) -> MirrorError {
    MirrorError::InvalidUrl {
        url: url.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn p(parts: &[&str]) -> PathBuf {
        parts.iter().collect()
    }

    #[rstest]
    #[case("https://example.com", &["index.html"])]
    #[case("https://example.com/", &["index.html"])]
    #[case("https://example.com/about", &["about.html"])]
    #[case("https://example.com/about/", &["about.html"])]
    #[case("https://example.com/img/logo.png", &["img", "logo.png"])]
    #[case("https://example.com/docs/intro?lang=en#top", &["docs", "intro.html"])]
    #[case("https://example.com/a//b", &["a", "b.html"])]
    #[case("https://example.com/v1.2/", &["v1.2"])]
    #[case("https://example.com/caf%C3%A9", &["caf%C3%A9.html"])]
    fn maps_url_path(#[case] url: &str, #[case] expected: &[&str]) {
        assert_eq!(map_url(url).unwrap(), p(expected));
    }

    #[rstest]
    #[case("not a url")]
    #[case("/relative/path")]
    #[case("mailto:someone@example.com")]
    fn rejects_unmappable_urls(#[case] url: &str) {
        let err = map_url(url).unwrap_err();
        assert!(matches!(err, MirrorError::InvalidUrl { .. }), "got: {err}");
    }

    #[test]
    fn dot_segments_never_escape_the_root() {
        let mapped = map_url("https://example.com/a/../../etc/passwd").unwrap();
        assert!(mapped
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_))));
    }

    #[rstest]
    #[case("https://example.com/")]
    #[case("https://example.com/about")]
    #[case("https://example.com/docs/guide/setup/")]
    #[case("https://example.com/img/logo.png")]
    fn mapping_is_idempotent_on_its_output(#[case] url: &str) {
        let first = map_url(url).unwrap();
        let as_url = format!(
            "https://example.com/{}",
            first.to_string_lossy().replace('\\', "/")
        );
        assert_eq!(map_url(&as_url).unwrap(), first);
    }
}
