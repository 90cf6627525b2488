//! Crawl collector: scope-aware concurrent page fetching for audits.
//!
//! The pipeline consumes the [`CrawlCollector`] capability; [`Collector`]
//! is the default reqwest-backed implementation. Per-page failures are
//! reported in the outcome, never as a crawl-level error.

mod engine;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use url::Url;

use seolens_shared::Result;

pub use engine::{Collector, url_to_path};

// ---------------------------------------------------------------------------
// Collector output
// ---------------------------------------------------------------------------

/// A successfully fetched page with its raw HTML.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final page URL (fragment stripped).
    pub url: String,
    /// Stable path within the site (e.g., `blog/post-1`).
    pub path: String,
    /// Title extracted from the first `<h1>` or `<title>`, if any.
    pub title: Option<String>,
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub html: String,
    /// SHA-256 of the body, for change detection.
    pub content_hash: String,
    /// When the page was fetched.
    pub fetched_at: DateTime<Utc>,
    /// Absolute in-document links, fragment-stripped.
    pub links: Vec<String>,
}

/// A page that could not be fetched (non-2xx, timeout, transport error).
#[derive(Debug, Clone)]
pub struct PageFailure {
    pub url: String,
    pub reason: String,
}

/// Summary of a completed crawl.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    /// Pages fetched, in discovery order.
    pub pages: Vec<FetchedPage>,
    /// Per-page failures. These become `fail`-status pages upstream.
    pub failures: Vec<PageFailure>,
    /// Subdomains of the target seen in links (recorded, not crawled).
    pub subdomains: Vec<String>,
    /// Pages skipped (out of scope, dedup, SSRF guard, page cap).
    pub pages_skipped: usize,
    /// Total duration of the crawl.
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Callback surface for crawl progress. `fetched` counts completed pages;
/// `discovered` is the current estimate of total pages (fetched + queued).
pub trait CrawlObserver: Send + Sync {
    fn page_fetched(&self, url: &str, fetched: usize, discovered: usize);
}

/// No-op observer for headless/test usage.
pub struct SilentObserver;

impl CrawlObserver for SilentObserver {
    fn page_fetched(&self, _url: &str, _fetched: usize, _discovered: usize) {}
}

/// The crawl capability the pipeline consumes.
pub trait CrawlCollector: Send + Sync + 'static {
    /// Crawl from `start_url` within the target domain. Individual page
    /// failures are absorbed into the outcome; an `Err` here means the crawl
    /// itself could not run.
    fn collect(
        &self,
        start_url: &Url,
        observer: &dyn CrawlObserver,
    ) -> impl Future<Output = Result<CrawlOutcome>> + Send;
}
