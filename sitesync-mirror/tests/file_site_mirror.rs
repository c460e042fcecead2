//! End-to-end mirror pass over a site served from `file://` URLs.

use std::fs;
use std::path::Path;
use std::time::Duration;

use sitesync_core::types::ExclusionSet;
use sitesync_mirror::{
    mirror, ContentRewriter, HttpContentFetcher, MirrorOptions, SitemapReader,
};
use tempfile::TempDir;
use url::Url;

fn file_url(path: &Path) -> String {
    Url::from_file_path(path).expect("absolute path").to_string()
}

/// Lay out a tiny "site" and a sitemap pointing at it.
fn publish_site(site: &Path, pages: &[(&str, &str)]) -> String {
    let mut urls = String::new();
    for (name, body) in pages {
        let path = site.join(name);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, body).expect("write page");
        urls.push_str(&format!("<url><loc>{}</loc></url>\n", file_url(&path)));
    }
    let sitemap = site.join("sitemap.xml");
    fs::write(
        &sitemap,
        format!("<?xml version=\"1.0\"?>\n<urlset>\n{urls}</urlset>\n"),
    )
    .expect("write sitemap");
    file_url(&sitemap)
}

#[test]
#[cfg(unix)]
fn mirror_pass_writes_rewrites_and_deletes() {
    let site = TempDir::new().expect("site");
    let work = TempDir::new().expect("work");

    let sitemap_url = publish_site(
        site.path(),
        &[
            ("home", r#"<a class="no-app-link" href="/pricing">Pricing</a>"#),
            ("docs/intro", "<h1>Intro</h1>"),
        ],
    );

    fs::write(work.path().join("stale.html"), "old").expect("seed stale");
    fs::write(work.path().join("CNAME"), "www.example.com").expect("seed excluded");

    let opts = MirrorOptions {
        root: work.path().to_path_buf(),
        sitemap_url,
        cutoff: None,
        exclusions: ExclusionSet::new(work.path(), ["CNAME"]),
    };
    let reader = SitemapReader::new(Duration::from_secs(5));
    let fetcher = HttpContentFetcher::new(
        Duration::from_secs(5),
        ContentRewriter::new("https://app.example.com", "https://www.example.com"),
    );

    let report = mirror(&opts, &reader, &fetcher).expect("mirror");
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.written.len(), 2);
    assert!(report.failed.is_empty());

    // Local layout mirrors the URL paths of the fixture site.
    let mapped_root = work.path().join(
        site.path()
            .strip_prefix("/")
            .expect("absolute site path"),
    );
    let home = fs::read_to_string(mapped_root.join("home.html")).expect("home page");
    assert_eq!(
        home,
        r#"<a class="no-app-link" href="https://www.example.com/pricing">Pricing</a>"#
    );
    assert!(mapped_root.join("docs").join("intro.html").exists());

    assert!(!work.path().join("stale.html").exists());
    assert!(work.path().join("CNAME").exists());

    // A second pass changes nothing.
    let again = mirror(&opts, &reader, &fetcher).expect("second mirror");
    assert!(again.written.is_empty());
    assert_eq!(again.unchanged, 2);
    assert!(again.deleted.is_empty());
}
