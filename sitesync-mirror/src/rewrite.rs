//! Host rewriting for downloaded content.
//!
//! - `.xml` URLs: every occurrence of the app host is replaced by the
//!   no-app host.
//! - HTML: `<a>` tags classed `no-app-link` point at the no-app host,
//!   tags classed `app-link` point at the app host. Absolute hrefs keep their
//!   path and query, appended to any path on the configured host; relative
//!   hrefs are resolved against the new host.
//! - Anything else, or a body that is not UTF-8, is returned untouched.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use url::Url;

const APP_LINK_CLASS: &str = "app-link";
const NO_APP_LINK_CLASS: &str = "no-app-link";

/// Rewrites links between the app and no-app hosts.
#[derive(Debug, Clone, Default)]
pub struct ContentRewriter {
    app_host: Option<Url>,
    no_app_host: Option<Url>,
    app_host_raw: String,
    no_app_host_raw: String,
}

/// How a response body should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Xml,
    Html,
    Binary,
}

impl ContentRewriter {
    /// Empty domains disable the corresponding rewrite.
    pub fn new(app_host_domain: &str, no_app_host_domain: &str) -> Self {
        Self {
            app_host: parse_host(app_host_domain),
            no_app_host: parse_host(no_app_host_domain),
            app_host_raw: app_host_domain.trim().to_string(),
            no_app_host_raw: no_app_host_domain.trim().to_string(),
        }
    }

    /// A rewriter that never changes anything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.app_host.is_some() || self.no_app_host.is_some()
    }

    /// Rewrite `body` downloaded from `url`.
    pub fn rewrite(&self, url: &str, content_type: Option<&str>, body: Vec<u8>) -> Vec<u8> {
        let kind = classify(url, content_type);
        if kind == ContentKind::Binary || !self.is_enabled() {
            return body;
        }
        let text = match String::from_utf8(body) {
            Ok(text) => text,
            Err(err) => return err.into_bytes(),
        };
        let changed = match kind {
            ContentKind::Xml => owned(self.rewrite_xml(&text)),
            ContentKind::Html => owned(self.rewrite_html(&text)),
            ContentKind::Binary => None,
        };
        changed.unwrap_or(text).into_bytes()
    }

    /// Replace the app host with the no-app host throughout an XML document.
    pub fn rewrite_xml<'a>(&self, xml: &'a str) -> Cow<'a, str> {
        if self.app_host_raw.is_empty() || !xml.contains(&self.app_host_raw) {
            return Cow::Borrowed(xml);
        }
        Cow::Owned(xml.replace(&self.app_host_raw, &self.no_app_host_raw))
    }

    /// Re-host the `href` of every classed `<a>` tag.
    pub fn rewrite_html<'a>(&self, html: &'a str) -> Cow<'a, str> {
        anchor_tag().replace_all(html, |caps: &Captures<'_>| {
            let tag = &caps[0];
            self.rewrite_anchor(tag).unwrap_or_else(|| tag.to_string())
        })
    }

    fn rewrite_anchor(&self, tag: &str) -> Option<String> {
        let class = attribute(class_attr(), tag)?;
        let host = if has_class(&class.value, NO_APP_LINK_CLASS) {
            self.no_app_host.as_ref()?
        } else if has_class(&class.value, APP_LINK_CLASS) {
            self.app_host.as_ref()?
        } else {
            return None;
        };

        let href = attribute(href_attr(), tag)?;
        let rehosted = rehost(&href.value, host)?;
        let mut out = String::with_capacity(tag.len() + rehosted.len());
        out.push_str(&tag[..href.start]);
        out.push_str(&rehosted);
        out.push_str(&tag[href.end..]);
        Some(out)
    }
}

/// Decide how to treat a body from its URL and `Content-Type`.
pub fn classify(url: &str, content_type: Option<&str>) -> ContentKind {
    let path = Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_else(|_| url.to_ascii_lowercase());
    if path.ends_with(".xml") {
        return ContentKind::Xml;
    }

    let mime = content_type
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty());
    match mime.as_deref() {
        Some("text/html") | Some("application/xhtml+xml") => ContentKind::Html,
        Some(_) => ContentKind::Binary,
        None => {
            let last = path.rsplit('/').next().unwrap_or("");
            match last.rsplit_once('.') {
                None => ContentKind::Html,
                Some((_, "html")) | Some((_, "htm")) => ContentKind::Html,
                Some(_) => ContentKind::Binary,
            }
        }
    }
}

fn owned(text: Cow<'_, str>) -> Option<String> {
    match text {
        Cow::Owned(changed) => Some(changed),
        Cow::Borrowed(_) => None,
    }
}

fn parse_host(domain: &str) -> Option<Url> {
    let domain = domain.trim();
    if domain.is_empty() {
        return None;
    }
    Url::parse(domain).ok().filter(Url::has_host)
}

/// Move `href` onto `host`; `None` leaves the original untouched.
fn rehost(href: &str, host: &Url) -> Option<String> {
    match Url::parse(href) {
        Ok(absolute) => {
            if !absolute.has_host() {
                return None;
            }
            // A path on the configured host (`https://h/base`) prefixes the link path.
            let prefix = host.path().trim_end_matches('/');
            let mut out = host.clone();
            out.set_path(&format!("{prefix}{}", absolute.path()));
            out.set_query(absolute.query());
            out.set_fragment(None);
            Some(out.to_string())
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => host.join(href).ok().map(String::from),
        Err(_) => None,
    }
}

fn has_class(list: &str, class: &str) -> bool {
    list.split_ascii_whitespace().any(|c| c == class)
}

struct Attribute {
    value: String,
    start: usize,
    end: usize,
}

/// First quoted value of the attribute matched by `re` within `tag`.
fn attribute(re: &Regex, tag: &str) -> Option<Attribute> {
    let caps = re.captures(tag)?;
    let m = caps.get(1).or_else(|| caps.get(2))?;
    Some(Attribute {
        value: m.as_str().to_string(),
        start: m.start(),
        end: m.end(),
    })
}

fn anchor_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<a\s[^>]*>").expect("valid regex"))
}

fn class_attr() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)\sclass\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
    })
}

fn href_attr() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)\shref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn rewriter() -> ContentRewriter {
        ContentRewriter::new("https://app.example.com", "https://www.example.com")
    }

    #[test]
    fn xml_replaces_app_host_everywhere() {
        let xml = "<loc>https://app.example.com/a</loc><loc>https://app.example.com/b</loc>";
        assert_eq!(
            rewriter().rewrite_xml(xml),
            "<loc>https://www.example.com/a</loc><loc>https://www.example.com/b</loc>"
        );
    }

    #[test]
    fn app_link_absolute_href_keeps_path_and_query() {
        let html = r#"<p><a class="btn app-link" href="https://old.example.net/login?next=/home#x">Log in</a></p>"#;
        assert_eq!(
            rewriter().rewrite_html(html),
            r#"<p><a class="btn app-link" href="https://app.example.com/login?next=/home">Log in</a></p>"#
        );
    }

    #[test]
    fn absolute_href_keeps_host_path_prefix() {
        let rewriter = ContentRewriter::new("https://app.example.com/base/", "");
        let html = r#"<a class="app-link" href="https://www.example.com/login?next=1">Log in</a>"#;
        assert_eq!(
            rewriter.rewrite_html(html),
            r#"<a class="app-link" href="https://app.example.com/base/login?next=1">Log in</a>"#
        );
    }

    #[test]
    fn no_app_link_relative_href_resolves_against_host() {
        let html = r#"<a href='pricing' class='no-app-link'>Pricing</a>"#;
        assert_eq!(
            rewriter().rewrite_html(html),
            r#"<a href='https://www.example.com/pricing' class='no-app-link'>Pricing</a>"#
        );
    }

    #[test]
    fn unclassed_and_similar_classes_are_left_alone() {
        let html = r#"<a href="/a">a</a><a class="app-linked" href="/b">b</a><link class="app-link" href="/c">"#;
        assert_eq!(rewriter().rewrite_html(html), html);
    }

    #[test]
    fn non_http_href_is_left_alone() {
        let html = r#"<a class="app-link" href="mailto:hi@example.com">mail</a>"#;
        assert_eq!(rewriter().rewrite_html(html), html);
    }

    #[test]
    fn binary_body_is_returned_verbatim() {
        let png = vec![0x89, b'P', b'N', b'G', 0xff, 0x00];
        let out = rewriter().rewrite("https://example.com/logo.png", Some("image/png"), png.clone());
        assert_eq!(out, png);
    }

    #[test]
    fn disabled_rewriter_changes_nothing() {
        let html = br#"<a class="app-link" href="/x">x</a>"#.to_vec();
        let out = ContentRewriter::disabled().rewrite("https://example.com/", Some("text/html"), html.clone());
        assert_eq!(out, html);
    }

    #[rstest]
    #[case("https://example.com/sitemap.xml", Some("application/xml"), ContentKind::Xml)]
    #[case("https://example.com/feed.XML", None, ContentKind::Xml)]
    #[case("https://example.com/about", Some("text/html; charset=utf-8"), ContentKind::Html)]
    #[case("https://example.com/about", None, ContentKind::Html)]
    #[case("https://example.com/page.htm", None, ContentKind::Html)]
    #[case("https://example.com/app.js", Some("application/javascript"), ContentKind::Binary)]
    #[case("https://example.com/logo.png", None, ContentKind::Binary)]
    fn classifies_content(
        #[case] url: &str,
        #[case] content_type: Option<&str>,
        #[case] expected: ContentKind,
    ) {
        assert_eq!(classify(url, content_type), expected);
    }
}
