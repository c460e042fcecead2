//! # sitesync-mirror
//!
//! Sitemap-driven content mirroring into a working tree.
//!
//! - [`pathmap`]: URL → relative file path
//! - [`reconcile`]: fetch/delete set computation
//! - [`scan`]: local file listing
//! - [`sitemap`]: [`SitemapSource`] and the HTTP/file reader
//! - [`fetch`]: [`ContentFetcher`] and the HTTP downloader
//! - [`rewrite`]: app/no-app host rewriting
//! - [`writer`]: hash-gated atomic writes and stale-file removal
//! - [`pipeline`]: [`mirror`] and [`plan`]

pub mod error;
pub mod fetch;
pub mod pathmap;
pub mod pipeline;
pub mod reconcile;
pub mod rewrite;
pub mod scan;
pub mod sitemap;
pub mod writer;

pub use error::MirrorError;
pub use fetch::{ContentFetcher, HttpContentFetcher};
pub use pipeline::{mirror, plan, FailedFetch, MirrorOptions, MirrorReport, Plan};
pub use reconcile::{FetchItem, InvalidEntry, ReconciliationResult};
pub use rewrite::ContentRewriter;
pub use sitemap::{SitemapReader, SitemapSource};
pub use writer::WriteResult;
