//! Concurrent, scope-aware crawl engine.
//!
//! The collector starts from a given URL, performs BFS traversal within the
//! target host, respects depth/concurrency/rate limits and a page cap, and
//! records subdomains it sees without crawling them.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, instrument, warn};
use url::Url;

use seolens_shared::{CrawlConfig, Result, SeolensError};

use crate::{CrawlCollector, CrawlObserver, CrawlOutcome, FetchedPage, PageFailure};

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("seolens/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Concurrent web crawler with scope-aware page fetching.
pub struct Collector {
    config: CrawlConfig,
    client: Client,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_localhost: bool,
}

impl Collector {
    /// Create a new collector with the given configuration.
    pub fn new(config: CrawlConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SeolensError::Fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            allow_localhost: false,
        })
    }

    /// Allow crawling localhost/private IPs (for integration tests).
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }
}

impl CrawlCollector for Collector {
    #[instrument(skip_all, fields(start_url = %start_url))]
    async fn collect(
        &self,
        start_url: &Url,
        observer: &dyn CrawlObserver,
    ) -> Result<CrawlOutcome> {
        let start_time = std::time::Instant::now();

        let scope = CrawlScope::new(start_url, &self.config);
        let visited = Arc::new(Mutex::new(HashSet::<String>::new()));
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency as usize));

        let mut queue: Vec<(Url, u32)> = vec![(start_url.clone(), 0)];
        let mut pages: Vec<FetchedPage> = Vec::new();
        let mut failures: Vec<PageFailure> = Vec::new();
        let mut subdomains: HashSet<String> = HashSet::new();
        let mut pages_skipped: usize = 0;

        info!(
            depth = self.config.depth,
            max_pages = self.config.max_pages,
            concurrency = self.config.concurrency,
            rate_limit_ms = self.config.rate_limit_ms,
            "starting crawl"
        );

        while !queue.is_empty() {
            if pages.len() >= self.config.max_pages {
                pages_skipped += queue.len();
                debug!(cap = self.config.max_pages, "page cap reached, stopping");
                break;
            }

            // Take a batch from the queue (up to concurrency limit)
            let batch: Vec<(Url, u32)> = {
                let drain_count = queue.len().min(self.config.concurrency as usize);
                queue.drain(..drain_count).collect()
            };

            let mut handles = Vec::new();

            for (url, depth) in batch {
                let normalized = normalize_url(&url);

                // Check if already visited
                {
                    let mut vis = visited.lock().await;
                    if vis.contains(&normalized) {
                        pages_skipped += 1;
                        continue;
                    }
                    vis.insert(normalized.clone());
                }

                // Check scope
                if !scope.in_scope(&url) {
                    if let Some(sub) = scope.subdomain_of(&url) {
                        subdomains.insert(sub);
                    }
                    debug!(%url, "out of scope, skipping");
                    pages_skipped += 1;
                    continue;
                }

                // Check SSRF
                if !self.allow_localhost && is_ssrf_target(&url) {
                    warn!(%url, "SSRF protection: blocked");
                    pages_skipped += 1;
                    continue;
                }

                let client = self.client.clone();
                let sem = semaphore.clone();
                let rate_limit = self.config.rate_limit_ms;

                handles.push(tokio::spawn(async move {
                    let _permit = sem.acquire().await.expect("semaphore closed");

                    // Rate limiting
                    if rate_limit > 0 {
                        tokio::time::sleep(Duration::from_millis(rate_limit)).await;
                    }

                    let result = fetch_page(&client, &url).await;
                    (url, depth, result)
                }));
            }

            // Collect results
            for handle in handles {
                match handle.await {
                    Ok((url, depth, Ok(page))) => {
                        // Enqueue child links if within depth
                        if depth < self.config.depth {
                            for link in &page.links {
                                if let Ok(link_url) = Url::parse(link) {
                                    if let Some(sub) = scope.subdomain_of(&link_url) {
                                        subdomains.insert(sub);
                                    }
                                    queue.push((link_url, depth + 1));
                                }
                            }
                        }

                        pages.push(page);
                        observer.page_fetched(
                            url.as_str(),
                            pages.len(),
                            pages.len() + queue.len(),
                        );
                    }
                    Ok((url, _depth, Err(e))) => {
                        warn!(%url, error = %e, "page fetch failed");
                        failures.push(PageFailure {
                            url: url.to_string(),
                            reason: e.to_string(),
                        });
                    }
                    Err(e) => {
                        failures.push(PageFailure {
                            url: "unknown".into(),
                            reason: format!("fetch task panicked: {e}"),
                        });
                    }
                }
            }
        }

        let duration = start_time.elapsed();
        let mut subdomains: Vec<String> = subdomains.into_iter().collect();
        subdomains.sort();

        info!(
            pages_fetched = pages.len(),
            failures = failures.len(),
            pages_skipped,
            subdomains = subdomains.len(),
            duration_ms = duration.as_millis(),
            "crawl completed"
        );

        Ok(CrawlOutcome {
            pages,
            failures,
            subdomains,
            pages_skipped,
            duration,
        })
    }
}

// ---------------------------------------------------------------------------
// Scope checking
// ---------------------------------------------------------------------------

/// Determines which URLs are "in scope" for a crawl.
struct CrawlScope {
    /// Base host that URLs must match.
    base_host: String,
    /// Base host with any `www.` prefix stripped, for subdomain detection.
    base_domain: String,
    /// Include patterns (if non-empty, URL must match at least one).
    include_patterns: Vec<regex::Regex>,
    /// Exclude patterns (if URL matches any, it's excluded).
    exclude_patterns: Vec<regex::Regex>,
}

impl CrawlScope {
    fn new(start_url: &Url, config: &CrawlConfig) -> Self {
        let base_host = start_url.host_str().unwrap_or("").to_string();
        let base_domain = base_host
            .strip_prefix("www.")
            .unwrap_or(&base_host)
            .to_string();

        let include_patterns = config
            .include_patterns
            .iter()
            .filter_map(|p| glob_to_regex(p))
            .collect();

        let exclude_patterns = config
            .exclude_patterns
            .iter()
            .filter_map(|p| glob_to_regex(p))
            .collect();

        Self {
            base_host,
            base_domain,
            include_patterns,
            exclude_patterns,
        }
    }

    fn in_scope(&self, url: &Url) -> bool {
        // Must be http/https
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        // Must match base host
        if url.host_str().unwrap_or("") != self.base_host {
            return false;
        }

        let path = url.path();

        // Check exclude patterns
        for pattern in &self.exclude_patterns {
            if pattern.is_match(path) {
                return false;
            }
        }

        // Check include patterns (if any configured, must match at least one)
        if !self.include_patterns.is_empty() {
            return self.include_patterns.iter().any(|p| p.is_match(path));
        }

        true
    }

    /// If `url` points at a subdomain of the target (e.g., `blog.example.com`
    /// for a crawl of `example.com`), return that host.
    fn subdomain_of(&self, url: &Url) -> Option<String> {
        let host = url.host_str()?;
        if host != self.base_host && host.ends_with(&format!(".{}", self.base_domain)) {
            Some(host.to_string())
        } else {
            None
        }
    }
}

/// Convert a glob-like pattern to a regex.
fn glob_to_regex(pattern: &str) -> Option<regex::Regex> {
    let escaped = regex::escape(pattern)
        .replace(r"\*\*", ".*")
        .replace(r"\*", "[^/]*")
        .replace(r"\?", ".");
    regex::Regex::new(&format!("^{escaped}$")).ok()
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    // Block non-HTTP schemes
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    // Block private/loopback IPs
    if let Some(host) = url.host_str() {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return is_private_ip(&ip);
        }
        // Block known local hostnames
        if host == "localhost"
            || host == "127.0.0.1"
            || host == "[::1]"
            || host.ends_with(".local")
            || host.ends_with(".internal")
        {
            return true;
        }
    }

    false
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

// ---------------------------------------------------------------------------
// Page fetching
// ---------------------------------------------------------------------------

/// Fetch a single page and extract links and title.
/// Non-2xx responses and transport errors surface as [`SeolensError::Fetch`].
async fn fetch_page(client: &Client, url: &Url) -> Result<FetchedPage> {
    debug!(%url, "fetching page");

    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| SeolensError::Fetch(format!("{url}: {e}")))?;

    let status = response.status();
    let status_code = status.as_u16();

    if !status.is_success() {
        return Err(SeolensError::Fetch(format!("{url}: HTTP {status}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| SeolensError::Fetch(format!("{url}: body read failed: {e}")))?;

    // Parse HTML
    let doc = Html::parse_document(&body);

    // Extract links
    let links = extract_links(&doc, url);

    // Title from the first H1, falling back to <title>
    let title = extract_title(&doc);

    let content_hash = compute_hash(&body);
    let page_path = url_to_path(url);

    let mut page_url = url.clone();
    page_url.set_fragment(None);

    Ok(FetchedPage {
        url: page_url.to_string(),
        path: page_path,
        title,
        status: status_code,
        html: body,
        content_hash,
        fetched_at: Utc::now(),
        links,
    })
}

/// Extract the page title: first `<h1>` text, then `<title>`.
fn extract_title(doc: &Html) -> Option<String> {
    let h1_sel = Selector::parse("h1").unwrap();
    let title_sel = Selector::parse("title").unwrap();

    let from = |el: scraper::ElementRef<'_>| {
        let text = el.text().collect::<String>().trim().to_string();
        (!text.is_empty()).then_some(text)
    };

    doc.select(&h1_sel)
        .next()
        .and_then(from)
        .or_else(|| doc.select(&title_sel).next().and_then(from))
}

/// Extract all links from a document, resolved against the base URL.
fn extract_links(doc: &Html, base_url: &Url) -> Vec<String> {
    let link_sel = Selector::parse("a[href]").unwrap();
    let mut links = Vec::new();

    for el in doc.select(&link_sel) {
        if let Some(href) = el.value().attr("href") {
            // Skip anchors, javascript:, mailto:
            if href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
            {
                continue;
            }

            // Resolve relative URLs
            if let Ok(resolved) = base_url.join(href) {
                // Strip fragment
                let mut resolved = resolved;
                resolved.set_fragment(None);
                links.push(resolved.to_string());
            }
        }
    }

    links
}

/// Normalize a URL for deduplication (strip fragment, trailing slash).
fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    let mut s = normalized.to_string();
    // Remove trailing slash for consistency (except root path)
    if s.ends_with('/') && s.matches('/').count() > 3 {
        s.pop();
    }
    s
}

/// Convert a URL path to a stable site-relative path.
pub fn url_to_path(url: &Url) -> String {
    let path = url.path();
    let cleaned = path
        .trim_start_matches('/')
        .trim_end_matches('/')
        .trim_end_matches(".html")
        .trim_end_matches(".htm");

    if cleaned.is_empty() {
        "index".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod collector_tests {
    use super::*;
    use crate::SilentObserver;

    fn test_config() -> CrawlConfig {
        CrawlConfig {
            depth: 3,
            max_pages: 200,
            concurrency: 2,
            rate_limit_ms: 0,
            include_patterns: vec![],
            exclude_patterns: vec![],
        }
    }

    #[test]
    fn test_normalize_url() {
        let url = Url::parse("https://shop.example.com/guide/intro#section-1").unwrap();
        let normalized = normalize_url(&url);
        assert!(!normalized.contains('#'));
        assert!(normalized.starts_with("https://shop.example.com/guide/intro"));
    }

    #[test]
    fn test_url_to_path() {
        let url = Url::parse("https://example.com/blog/first-post.html").unwrap();
        assert_eq!(url_to_path(&url), "blog/first-post");

        let root = Url::parse("https://example.com/").unwrap();
        assert_eq!(url_to_path(&root), "index");
    }

    #[test]
    fn test_compute_hash() {
        let hash = compute_hash("hello world");
        assert_eq!(hash.len(), 64); // SHA-256 = 64 hex chars
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_ssrf_protection_blocks_file() {
        let url = Url::parse("file:///etc/passwd").unwrap();
        assert!(is_ssrf_target(&url));
    }

    #[test]
    fn test_ssrf_protection_blocks_private_ip() {
        let url = Url::parse("http://192.168.1.1/admin").unwrap();
        assert!(is_ssrf_target(&url));

        let url = Url::parse("http://10.0.0.1/").unwrap();
        assert!(is_ssrf_target(&url));

        let url = Url::parse("http://127.0.0.1:8080/").unwrap();
        assert!(is_ssrf_target(&url));
    }

    #[test]
    fn test_ssrf_protection_allows_public() {
        let url = Url::parse("https://example.com/page").unwrap();
        assert!(!is_ssrf_target(&url));
    }

    #[test]
    fn test_ssrf_blocks_localhost() {
        let url = Url::parse("http://localhost:3000/api").unwrap();
        assert!(is_ssrf_target(&url));
    }

    #[test]
    fn test_scope_same_host() {
        let start = Url::parse("https://example.com/").unwrap();
        let scope = CrawlScope::new(&start, &test_config());

        let in_scope = Url::parse("https://example.com/pricing").unwrap();
        assert!(scope.in_scope(&in_scope));

        let out_of_scope = Url::parse("https://other.com/pricing").unwrap();
        assert!(!scope.in_scope(&out_of_scope));
    }

    #[test]
    fn test_scope_excludes() {
        let start = Url::parse("https://example.com/").unwrap();
        let mut config = test_config();
        config.exclude_patterns = vec!["/cart/**".into()];
        let scope = CrawlScope::new(&start, &config);

        let cart = Url::parse("https://example.com/cart/checkout").unwrap();
        assert!(!scope.in_scope(&cart));

        let blog = Url::parse("https://example.com/blog/post").unwrap();
        assert!(scope.in_scope(&blog));
    }

    #[test]
    fn test_subdomain_detection() {
        let start = Url::parse("https://www.example.com/").unwrap();
        let scope = CrawlScope::new(&start, &test_config());

        let sub = Url::parse("https://blog.example.com/post").unwrap();
        assert_eq!(scope.subdomain_of(&sub), Some("blog.example.com".into()));

        let same = Url::parse("https://www.example.com/post").unwrap();
        assert_eq!(scope.subdomain_of(&same), None);

        let unrelated = Url::parse("https://example.org/post").unwrap();
        assert_eq!(scope.subdomain_of(&unrelated), None);
    }

    #[test]
    fn test_extract_links() {
        let html = r##"<html><body><a href="/page2">Page 2</a><a href="https://external.com">External</a><a href="#section">Anchor</a><a href="relative/path">Relative</a></body></html>"##;

        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/page1").unwrap();
        let links = extract_links(&doc, &base);

        assert!(links.contains(&"https://example.com/page2".to_string()));
        assert!(links.contains(&"https://external.com/".to_string()));
        assert!(links.contains(&"https://example.com/relative/path".to_string()));
        // Should NOT contain anchor-only links
        assert!(!links.iter().any(|l| l.contains('#')));
    }

    #[test]
    fn test_extract_title_falls_back_to_title_tag() {
        let doc = Html::parse_document("<html><head><title>Fallback</title></head><body></body></html>");
        assert_eq!(extract_title(&doc), Some("Fallback".into()));

        let doc = Html::parse_document("<html><body><h1>Heading</h1></body></html>");
        assert_eq!(extract_title(&doc), Some("Heading".into()));
    }

    #[tokio::test]
    async fn test_crawl_with_mock_server() {
        let server = wiremock::MockServer::start().await;

        // Page 1 links to page 2
        let page1 = r#"<html><body>
            <main>
                <h1>Home</h1>
                <p>Welcome to the shop.</p>
                <a href="/pricing">Pricing</a>
            </main>
        </body></html>"#;

        // Page 2 links to page 3
        let page2 = r#"<html><body>
            <main>
                <h1>Pricing</h1>
                <p>Plans and tiers.</p>
                <a href="/about">About us</a>
            </main>
        </body></html>"#;

        // Page 3 is a leaf
        let page3 = r#"<html><body>
            <main>
                <h1>About</h1>
                <p>Who we are.</p>
            </main>
        </body></html>"#;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(page1))
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/pricing"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(page2))
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/about"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(page3))
            .mount(&server)
            .await;

        let collector = Collector::new(test_config()).unwrap().allow_localhost();
        let start_url = Url::parse(&server.uri()).unwrap();
        let outcome = collector.collect(&start_url, &SilentObserver).await.unwrap();

        assert_eq!(outcome.pages.len(), 3);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.pages[0].title.as_deref(), Some("Home"));
        assert!(outcome.pages.iter().any(|p| p.path == "pricing"));
    }

    #[tokio::test]
    async fn test_crawl_respects_depth() {
        let server = wiremock::MockServer::start().await;

        let page1 = r#"<html><body><main>
            <h1>Root</h1><a href="/level1">Level 1</a>
        </main></body></html>"#;

        let page2 = r#"<html><body><main>
            <h1>Level 1</h1><a href="/level2">Level 2</a>
        </main></body></html>"#;

        let page3 = r#"<html><body><main>
            <h1>Level 2</h1><p>Deep page</p>
        </main></body></html>"#;

        wiremock::Mock::given(wiremock::matchers::path("/"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(page1))
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::path("/level1"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(page2))
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::path("/level2"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(page3))
            .mount(&server)
            .await;

        let mut config = test_config();
        config.depth = 1;

        let collector = Collector::new(config).unwrap().allow_localhost();
        let start_url = Url::parse(&server.uri()).unwrap();
        let outcome = collector.collect(&start_url, &SilentObserver).await.unwrap();

        // Root (depth=0) and level1 (depth=1), but not level2 (depth=2)
        assert_eq!(outcome.pages.len(), 2);
    }

    #[tokio::test]
    async fn test_crawl_respects_page_cap() {
        let server = wiremock::MockServer::start().await;

        // Root links to many children, each a leaf.
        let mut root = String::from("<html><body><main><h1>Hub</h1>");
        for i in 0..10 {
            root.push_str(&format!("<a href=\"/p{i}\">p{i}</a>"));
        }
        root.push_str("</main></body></html>");

        wiremock::Mock::given(wiremock::matchers::path("/"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(root))
            .mount(&server)
            .await;

        for i in 0..10 {
            wiremock::Mock::given(wiremock::matchers::path(format!("/p{i}")))
                .respond_with(
                    wiremock::ResponseTemplate::new(200)
                        .set_body_string(format!("<html><body><h1>p{i}</h1></body></html>")),
                )
                .mount(&server)
                .await;
        }

        let mut config = test_config();
        config.max_pages = 4;

        let collector = Collector::new(config).unwrap().allow_localhost();
        let start_url = Url::parse(&server.uri()).unwrap();
        let outcome = collector.collect(&start_url, &SilentObserver).await.unwrap();

        assert!(outcome.pages.len() <= 5); // cap checked per batch round
        assert!(outcome.pages_skipped > 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_recorded_not_fatal() {
        let server = wiremock::MockServer::start().await;

        let page1 = r#"<html><body><main>
            <h1>Root</h1><a href="/gone">Missing page</a>
        </main></body></html>"#;

        wiremock::Mock::given(wiremock::matchers::path("/"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(page1))
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::path("/gone"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let collector = Collector::new(test_config()).unwrap().allow_localhost();
        let start_url = Url::parse(&server.uri()).unwrap();
        let outcome = collector.collect(&start_url, &SilentObserver).await.unwrap();

        assert_eq!(outcome.pages.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].url.ends_with("/gone"));
        assert!(outcome.failures[0].reason.contains("404"));
    }
}
