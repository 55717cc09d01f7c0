//! Operation identifier discovery from the web client's script bundles.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::bytes::{Regex as BytesRegex, RegexBuilder};
use regex::Regex;
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::constants::{target_operations, BUNDLE_URL_PATTERN, DISCOVERY_PAGES, QUERY_ID_PATTERN};
use crate::http_client::{FetchError, HttpFetch};

/// Default number of bundles fetched at once.
pub const DEFAULT_BUNDLE_CONCURRENCY: usize = 6;

/// Non-fatal failures while scraping a single page or bundle.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("fetch of {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not parse bundle {url}: {reason}")]
    BundleParse { url: String, reason: String },
}

/// Source of freshly discovered operation identifiers.
#[async_trait]
pub trait OperationDiscovery: Send + Sync {
    /// Map of operation name to identifier. Never fails; an empty map means
    /// nothing could be discovered.
    async fn discover(&self) -> HashMap<String, String>;
}

static BUNDLE_URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(BUNDLE_URL_PATTERN).unwrap());

static QUERY_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(QUERY_ID_PATTERN).unwrap());

static SCRIPT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script[src], link[href]").unwrap());

/// Ordered extraction patterns with (query id group, operation group).
///
/// Byte-oriented with Unicode disabled so the 4000-character gaps stay small.
static OPERATION_PATTERNS: LazyLock<Vec<(BytesRegex, usize, usize)>> = LazyLock::new(|| {
    let build = |pattern: &str| {
        RegexBuilder::new(pattern)
            .unicode(false)
            .dot_matches_new_line(true)
            .build()
            .unwrap()
    };
    vec![
        // e.exports={queryId:"...",operationName:"..."}
        (
            build(r#"e\.exports=\{queryId\s*:\s*["']([^"']+)["']\s*,\s*operationName\s*:\s*["']([^"']+)["']"#),
            1,
            2,
        ),
        // e.exports={operationName:"...",queryId:"..."}
        (
            build(r#"e\.exports=\{operationName\s*:\s*["']([^"']+)["']\s*,\s*queryId\s*:\s*["']([^"']+)["']"#),
            2,
            1,
        ),
        // operationName:"..." then queryId:"..." within 4000 chars
        (
            build(r#"operationName\s*[:=]\s*["']([^"']+)["'](.{0,4000}?)queryId\s*[:=]\s*["']([^"']+)["']"#),
            3,
            1,
        ),
        // queryId:"..." then operationName:"..." within 4000 chars
        (
            build(r#"queryId\s*[:=]\s*["']([^"']+)["'](.{0,4000}?)operationName\s*[:=]\s*["']([^"']+)["']"#),
            1,
            3,
        ),
    ]
});

/// Check an identifier against the allowed character set.
pub fn is_valid_query_id(id: &str) -> bool {
    QUERY_ID_RE.is_match(id)
}

/// Extract client bundle URLs referenced by a page, in first-seen order.
pub fn extract_bundle_urls(html: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for m in BUNDLE_URL_RE.find_iter(html) {
        if seen.insert(m.as_str().to_string()) {
            urls.push(m.as_str().to_string());
        }
    }

    // Attribute values may be split or escaped in ways the raw scan misses.
    let document = Html::parse_document(html);
    for element in document.select(&SCRIPT_SELECTOR) {
        let value = element
            .value()
            .attr("src")
            .or_else(|| element.value().attr("href"));
        if let Some(value) = value {
            if let Some(m) = BUNDLE_URL_RE.find(value) {
                if seen.insert(m.as_str().to_string()) {
                    urls.push(m.as_str().to_string());
                }
            }
        }
    }

    urls
}

/// Extract identifiers for `targets` from one bundle's source.
///
/// Patterns are tried in order and the first match per operation is kept.
pub fn extract_operations(bundle: &str, targets: &HashSet<String>) -> HashMap<String, String> {
    let mut discovered = HashMap::new();

    for (pattern, id_group, name_group) in OPERATION_PATTERNS.iter() {
        for caps in pattern.captures_iter(bundle.as_bytes()) {
            let (Some(id), Some(name)) = (caps.get(*id_group), caps.get(*name_group)) else {
                continue;
            };
            let name = String::from_utf8_lossy(name.as_bytes());
            let id = String::from_utf8_lossy(id.as_bytes());

            if !targets.contains(name.as_ref()) || discovered.contains_key(name.as_ref()) {
                continue;
            }
            if !is_valid_query_id(&id) {
                debug!("Rejected identifier {:?} for {}", id, name);
                continue;
            }

            discovered.insert(name.into_owned(), id.into_owned());
            if discovered.len() == targets.len() {
                return discovered;
            }
        }
    }

    discovered
}

/// Discovers identifiers by fetching public pages and their bundles.
pub struct BundleScraper {
    http: Arc<dyn HttpFetch>,
    pages: Vec<String>,
    targets: HashSet<String>,
    concurrency: usize,
}

impl BundleScraper {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self {
            http,
            pages: DISCOVERY_PAGES.iter().map(|p| p.to_string()).collect(),
            targets: target_operations().into_iter().map(String::from).collect(),
            concurrency: DEFAULT_BUNDLE_CONCURRENCY,
        }
    }

    pub fn with_pages(mut self, pages: Vec<String>) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    async fn fetch_text(&self, url: &str) -> Result<String, ScrapeError> {
        let response = self
            .http
            .get(url, &[])
            .await
            .map_err(|source| ScrapeError::Fetch {
                url: url.to_string(),
                source,
            })?;
        if !response.is_success() {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok(response.body)
    }

    async fn scrape_bundle(&self, url: &str) -> Result<HashMap<String, String>, ScrapeError> {
        let body = self.fetch_text(url).await?;
        let trimmed = body.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('<') {
            return Err(ScrapeError::BundleParse {
                url: url.to_string(),
                reason: "not a script".to_string(),
            });
        }
        Ok(extract_operations(&body, &self.targets))
    }

    /// Collect bundle URLs from every reachable discovery page.
    async fn collect_bundle_urls(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut urls = Vec::new();

        for page in &self.pages {
            match self.fetch_text(page).await {
                Ok(html) => {
                    for url in extract_bundle_urls(&html) {
                        if seen.insert(url.clone()) {
                            urls.push(url);
                        }
                    }
                }
                Err(e) => warn!("Skipping discovery page: {}", e),
            }
        }

        urls
    }
}

#[async_trait]
impl OperationDiscovery for BundleScraper {
    async fn discover(&self) -> HashMap<String, String> {
        let bundle_urls = self.collect_bundle_urls().await;
        if bundle_urls.is_empty() {
            warn!("No client bundles found on discovery pages");
            return HashMap::new();
        }
        debug!("Scanning {} bundles", bundle_urls.len());

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let fetches = bundle_urls.iter().map(|url| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                match self.scrape_bundle(url).await {
                    Ok(found) => Some(found),
                    Err(e) => {
                        debug!("Skipping bundle: {}", e);
                        None
                    }
                }
            }
        });

        // Results come back in URL order; later bundles override earlier ones.
        let mut discovered = HashMap::new();
        for found in futures::future::join_all(fetches).await.into_iter().flatten() {
            discovered.extend(found);
        }

        info!(
            "Discovered {} of {} operation ids",
            discovered.len(),
            self.targets.len()
        );
        discovered
    }
}
