//! Content download.

use std::io::Read;
use std::time::Duration;

use crate::error::{fetch_err, MirrorError};
use crate::rewrite::ContentRewriter;
use crate::sitemap::{file_url_path, USER_AGENT};

/// Downloads the bytes that should land on disk for one URL.
pub trait ContentFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, MirrorError>;
}

/// `ureq`-backed fetcher that runs every body through a [`ContentRewriter`].
///
/// `file://` URLs are read from disk so local fixtures can stand in for a site.
pub struct HttpContentFetcher {
    agent: ureq::Agent,
    rewriter: ContentRewriter,
}

impl HttpContentFetcher {
    pub fn new(timeout: Duration, rewriter: ContentRewriter) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent, rewriter }
    }
}

impl ContentFetcher for HttpContentFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, MirrorError> {
        if let Some(path) = file_url_path(url)? {
            let body = std::fs::read(&path).map_err(|e| fetch_err(url, e))?;
            return Ok(self.rewriter.rewrite(url, None, body));
        }

        let response = self
            .agent
            .get(url)
            .set("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| fetch_err(url, e))?;
        let content_type = response.header("Content-Type").map(str::to_string);
        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| fetch_err(url, e))?;
        tracing::debug!(url = %url, bytes = body.len(), "downloaded");
        Ok(self.rewriter.rewrite(url, content_type.as_deref(), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use url::Url;

    #[test]
    fn file_urls_are_read_and_rewritten() {
        let tmp = TempDir::new().unwrap();
        let page = tmp.path().join("about");
        fs::write(&page, r#"<a class="app-link" href="/login">in</a>"#).unwrap();
        let url = Url::from_file_path(&page).unwrap();

        let fetcher = HttpContentFetcher::new(
            Duration::from_secs(5),
            ContentRewriter::new("https://app.example.com", "https://www.example.com"),
        );
        let body = fetcher.fetch(url.as_str()).unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            r#"<a class="app-link" href="https://app.example.com/login">in</a>"#
        );
    }

    #[test]
    fn unreachable_host_is_a_fetch_error() {
        let fetcher = HttpContentFetcher::new(Duration::from_secs(2), ContentRewriter::disabled());
        let err = fetcher.fetch("http://127.0.0.1:1/nothing").unwrap_err();
        assert!(matches!(err, MirrorError::Fetch { .. }), "got: {err}");
    }
}
