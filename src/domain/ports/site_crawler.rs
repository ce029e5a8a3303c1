use crate::domain::entities::{CrawlOptions, CrawlOutput};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CrawlError {
    #[error("Invalid seed URL: {0}")]
    InvalidUrl(String),
    #[error("Seed page unreachable: {0}")]
    SeedUnreachable(String),
    #[error("No pages could be crawled from {0}")]
    NoPages(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("timeout after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("not an HTML document ({0})")]
    NotHtml(String),
    #[error("network error: {0}")]
    Network(String),
}

/// Fetched HTML document.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// URL after redirects.
    pub url: String,
    pub html: String,
}

/// Retrieves one page. Implementations must honour `timeout`.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage, FetchError>;
}

/// Crawls a site for generation context.
#[async_trait]
pub trait SiteCrawler: Send + Sync {
    async fn crawl(&self, seed_url: &str, options: &CrawlOptions) -> Result<CrawlOutput, CrawlError>;
}
