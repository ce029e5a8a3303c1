use async_trait::async_trait;
use futures::future::join_all;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::{Origin, Url};

use crate::domain::entities::{CrawlOptions, CrawlOutput, CrawledPage};
use crate::domain::ports::site_crawler::{
    CrawlError, FetchError, FetchedPage, PageFetcher, SiteCrawler,
};

/// Maximum characters of text kept per page.
pub const PAGE_TEXT_LIMIT: usize = 8_000;
/// Maximum characters of the concatenated context.
pub const CONTEXT_LIMIT: usize = 24_000;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; seoscribe/0.1; +https://github.com/seoscribe)";

const CONTENT_SELECTORS: [&str; 6] = [
    "main",
    "article",
    "[role='main']",
    "#content",
    "#main",
    ".content",
];

const SKIPPED_ELEMENTS: [&str; 9] = [
    "script", "style", "noscript", "nav", "header", "footer", "aside", "iframe", "svg",
];

const SKIPPED_PATHS: [&str; 23] = [
    "/wp-admin",
    "/wp-login",
    "/wp-content/uploads",
    "/login",
    "/logout",
    "/signin",
    "/signout",
    "/auth",
    "/api/",
    "/cdn-cgi/",
    "/feed",
    "/rss",
    "/sitemap",
    ".pdf",
    ".jpg",
    ".jpeg",
    ".png",
    ".gif",
    ".svg",
    ".css",
    ".js",
    ".xml",
    ".json",
];

/// reqwest-backed fetcher that only accepts HTML responses.
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml;q=0.9,*/*;q=0.5",
            ),
        );

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage, FetchError> {
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout(timeout)
            } else {
                FetchError::Network(e.to_string())
            }
        };

        // The request timeout covers reading the body as well.
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.is_empty() && !content_type.contains("html") {
            return Err(FetchError::NotHtml(content_type));
        }

        let final_url = response.url().to_string();
        let html = response.text().await.map_err(map_err)?;

        Ok(FetchedPage {
            url: final_url,
            html,
        })
    }
}

/// Breadth-first same-origin crawler over any [`PageFetcher`].
pub struct WebCrawler {
    fetcher: Arc<dyn PageFetcher>,
}

impl WebCrawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl SiteCrawler for WebCrawler {
    async fn crawl(
        &self,
        seed_url: &str,
        options: &CrawlOptions,
    ) -> Result<CrawlOutput, CrawlError> {
        let seed = Url::parse(seed_url).map_err(|e| CrawlError::InvalidUrl(e.to_string()))?;
        if !matches!(seed.scheme(), "http" | "https") {
            return Err(CrawlError::InvalidUrl(seed_url.to_string()));
        }
        let max_pages = options.max_pages.max(1);
        let timeout = options.timeout_per_request;

        info!(
            url = %seed,
            max_pages,
            concurrency = options.concurrency,
            "Starting crawl"
        );

        let seed_page = self
            .fetcher
            .fetch(seed.as_str(), timeout)
            .await
            .map_err(|e| CrawlError::SeedUnreachable(format!("{}: {}", seed, e)))?;

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(normalize_link(&seed));

        // A redirected seed (e.g. to `www.`) defines the site as well.
        let mut origins = vec![seed.origin()];
        if let Ok(final_url) = Url::parse(&seed_page.url) {
            visited.insert(normalize_link(&final_url));
            if final_url.origin() != seed.origin() {
                debug!(from = %seed, to = %final_url, "Seed redirected");
                origins.push(final_url.origin());
            }
        }

        let (first, mut frontier) = extract_page(&seed_page, &seed, &origins);
        let mut pages = vec![first];
        frontier.retain(|link| visited.insert(link.clone()));

        let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
        // Failed fetches do not count as pages, so bound the attempts too.
        let mut attempts_left = max_pages.saturating_mul(3);

        while pages.len() < max_pages && !frontier.is_empty() && attempts_left > 0 {
            let room = (max_pages - pages.len()).min(attempts_left);
            let take = room.min(frontier.len());
            let batch: Vec<String> = frontier.drain(..take).collect();
            attempts_left -= batch.len();

            let mut handles = Vec::with_capacity(batch.len());
            for url in batch {
                let fetcher = self.fetcher.clone();
                let sem = semaphore.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await.ok();
                    let result = fetcher.fetch(&url, timeout).await;
                    (url, result)
                }));
            }

            // join_all yields in spawn order, keeping insertion order stable.
            for joined in join_all(handles).await {
                let (url, result) = match joined {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "Crawl task panicked");
                        continue;
                    }
                };
                match result {
                    Ok(fetched) if pages.len() < max_pages => {
                        let (page, links) = extract_page(&fetched, &seed, &origins);
                        debug!(url = %page.url, chars = page.text.len(), "Fetched page");
                        pages.push(page);
                        for link in links {
                            if visited.insert(link.clone()) {
                                frontier.push(link);
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(url = %url, error = %e, "Skipping page");
                    }
                }
            }
        }

        metrics::counter!("crawl_pages_fetched_total").increment(pages.len() as u64);

        let context = build_context(&pages);
        if context.trim().is_empty() {
            return Err(CrawlError::NoPages(seed.to_string()));
        }

        info!(url = %seed, pages = pages.len(), context_chars = context.len(), "Crawl finished");
        Ok(CrawlOutput { pages, context })
    }
}

/// Parse one fetched document into a page and its links on the site's
/// `origins`.
fn extract_page(
    fetched: &FetchedPage,
    seed: &Url,
    origins: &[Origin],
) -> (CrawledPage, Vec<String>) {
    let document = Html::parse_document(&fetched.html);
    let base = Url::parse(&fetched.url).unwrap_or_else(|_| seed.clone());

    let title = extract_title(&document).unwrap_or_else(|| fetched.url.clone());
    let text = truncate_chars(&extract_text(&document), PAGE_TEXT_LIMIT);
    let links = extract_links(&document, &base, origins);

    let page = CrawledPage {
        title,
        url: fetched.url.clone(),
        text,
    };
    (page, links)
}

fn extract_title(document: &Html) -> Option<String> {
    ["title", "h1"].iter().find_map(|s| {
        let selector = Selector::parse(s).ok()?;
        document
            .select(&selector)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty())
    })
}

/// Visible text of the main content region, or the body when there is none.
fn extract_text(document: &Html) -> String {
    let root = CONTENT_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| document.select(&selector).next())
        .or_else(|| {
            Selector::parse("body")
                .ok()
                .and_then(|selector| document.select(&selector).next())
        })
        .unwrap_or_else(|| document.root_element());

    collapse_whitespace(&visible_text(root))
}

fn visible_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|el| SKIPPED_ELEMENTS.contains(&el.name()))
                .unwrap_or(false)
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    out
}

fn extract_links(document: &Html, base: &Url, origins: &[Origin]) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .filter(|url| {
            matches!(url.scheme(), "http" | "https")
                && origins.contains(&url.origin())
                && !is_skip_path(url.path())
        })
        .map(|url| normalize_link(&url))
        .filter(|link| seen.insert(link.clone()))
        .collect()
}

/// Drop query and fragment and trailing slash so variants collapse.
fn normalize_link(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_query(None);
    normalized.set_fragment(None);
    let path = normalized.path().trim_end_matches('/').to_string();
    normalized.set_path(if path.is_empty() { "/" } else { &path });
    normalized.to_string()
}

fn is_skip_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    SKIPPED_PATHS.iter().any(|pattern| lower.contains(pattern))
}

fn build_context(pages: &[CrawledPage]) -> String {
    let mut context = String::new();
    for page in pages.iter().filter(|p| !p.text.is_empty()) {
        if !context.is_empty() {
            context.push_str("\n\n");
        }
        context.push_str(&format!("## {} ({})\n{}", page.title, page.url, page.text));
    }
    truncate_chars(&context, CONTEXT_LIMIT)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
