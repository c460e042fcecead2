//! Sitemap discovery.
//!
//! [`SitemapReader`] downloads a sitemap over HTTP(S) or reads it from a
//! `file://` URL and returns its `<url>` entries. A `<sitemapindex>` is
//! followed one level deep; nested indexes below that are ignored.
//!
//! Parsing is deliberately lenient about namespaces and whitespace: only
//! `<loc>` and `<lastmod>` are read, and XML character entities in them are
//! decoded.

use std::io::Read;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use url::Url;

use sitesync_core::types::DiscoveryEntry;

use crate::error::{fetch_err, MirrorError};

/// `User-Agent` sent with every request.
pub const USER_AGENT: &str = concat!("sitesync/", env!("CARGO_PKG_VERSION"));

/// Source of discovery entries for one run.
pub trait SitemapSource {
    fn fetch(&self, url: &str) -> Result<Vec<DiscoveryEntry>, MirrorError>;
}

/// A parsed sitemap document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    UrlSet(Vec<DiscoveryEntry>),
    Index(Vec<String>),
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// HTTP(S) and `file://` sitemap reader.
pub struct SitemapReader {
    agent: ureq::Agent,
}

impl SitemapReader {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent }
    }

    fn read_document(&self, url: &str) -> Result<String, MirrorError> {
        read_text(&self.agent, url)
    }
}

impl SitemapSource for SitemapReader {
    fn fetch(&self, url: &str) -> Result<Vec<DiscoveryEntry>, MirrorError> {
        let body = self.read_document(url)?;
        match parse_sitemap(url, &body)? {
            SitemapDocument::UrlSet(entries) => {
                tracing::info!(url = %url, entries = entries.len(), "read sitemap");
                Ok(entries)
            }
            SitemapDocument::Index(children) => {
                tracing::info!(url = %url, sitemaps = children.len(), "read sitemap index");
                let mut entries = Vec::new();
                for child in children {
                    let body = self.read_document(&child)?;
                    match parse_sitemap(&child, &body)? {
                        SitemapDocument::UrlSet(found) => {
                            tracing::debug!(url = %child, entries = found.len(), "read child sitemap");
                            entries.extend(found);
                        }
                        SitemapDocument::Index(_) => {
                            tracing::warn!(url = %child, "ignoring nested sitemap index");
                        }
                    }
                }
                Ok(entries)
            }
        }
    }
}

/// Read a URL as UTF-8 text, through `agent` for HTTP(S) or from disk for `file://`.
pub(crate) fn read_text(agent: &ureq::Agent, url: &str) -> Result<String, MirrorError> {
    if let Some(path) = file_url_path(url)? {
        return std::fs::read_to_string(&path).map_err(|e| fetch_err(url, e));
    }
    let response = agent
        .get(url)
        .set("User-Agent", USER_AGENT)
        .call()
        .map_err(|e| fetch_err(url, e))?;
    let mut body = String::new();
    response
        .into_reader()
        .read_to_string(&mut body)
        .map_err(|e| fetch_err(url, e))?;
    Ok(body)
}

/// Local path for a `file://` URL, `None` for anything else.
pub(crate) fn file_url_path(url: &str) -> Result<Option<std::path::PathBuf>, MirrorError> {
    if !url.starts_with("file:") {
        return Ok(None);
    }
    let parsed = Url::parse(url).map_err(|e| fetch_err(url, e))?;
    parsed
        .to_file_path()
        .map(Some)
        .map_err(|()| fetch_err(url, "not a local file path"))
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid regex"))
}

fn url_block() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    re(&CELL, r"(?is)<(?:\w+:)?url\b[^>]*>(.*?)</(?:\w+:)?url\s*>")
}

fn sitemap_block() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    re(&CELL, r"(?is)<(?:\w+:)?sitemap\b[^>]*>(.*?)</(?:\w+:)?sitemap\s*>")
}

fn loc_tag() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    re(&CELL, r"(?is)<(?:\w+:)?loc\b[^>]*>(.*?)</(?:\w+:)?loc\s*>")
}

fn lastmod_tag() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    re(&CELL, r"(?is)<(?:\w+:)?lastmod\b[^>]*>(.*?)</(?:\w+:)?lastmod\s*>")
}

fn root_tag() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    re(&CELL, r"(?i)<(?:\w+:)?(urlset|sitemapindex)\b")
}

/// Parse a sitemap or sitemap index document fetched from `url`.
pub fn parse_sitemap(url: &str, xml: &str) -> Result<SitemapDocument, MirrorError> {
    let root = root_tag()
        .captures(xml)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
        .ok_or_else(|| MirrorError::Sitemap {
            url: url.to_string(),
            reason: "no <urlset> or <sitemapindex> element".to_string(),
        })?;

    if root == "sitemapindex" {
        let children = sitemap_block()
            .captures_iter(xml)
            .filter_map(|block| block.get(1).and_then(|b| element_text(loc_tag(), b.as_str())))
            .filter(|loc| !loc.is_empty())
            .collect();
        return Ok(SitemapDocument::Index(children));
    }

    let entries = url_block()
        .captures_iter(xml)
        .filter_map(|block| {
            let body = block.get(1)?.as_str();
            let loc = element_text(loc_tag(), body).filter(|loc| !loc.is_empty())?;
            let last_modified = element_text(lastmod_tag(), body).and_then(|raw| parse_lastmod(&raw));
            Some(DiscoveryEntry::new(loc, last_modified))
        })
        .collect();
    Ok(SitemapDocument::UrlSet(entries))
}

fn element_text(tag: &Regex, body: &str) -> Option<String> {
    let raw = tag.captures(body)?.get(1)?.as_str().trim();
    let raw = raw
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .map(str::to_string)
        .unwrap_or_else(|| decode_entities(raw));
    Some(raw.trim().to_string())
}

/// Decode the predefined XML entities and numeric character references.
fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let name = &tail[1..end];
        let decoded = match name {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| name.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse a W3C datetime as used in `<lastmod>`; unparseable values are `None`.
pub fn parse_lastmod(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}
