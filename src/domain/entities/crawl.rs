use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::job::CrawledPageRef;

/// Limits applied to one crawl.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrawlOptions {
    pub max_pages: usize,
    pub concurrency: usize,
    pub timeout_per_request: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrawledPage {
    pub title: String,
    pub url: String,
    pub text: String,
}

impl CrawledPage {
    pub fn to_ref(&self) -> CrawledPageRef {
        CrawledPageRef {
            title: self.title.clone(),
            url: self.url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrawlOutput {
    pub pages: Vec<CrawledPage>,
    /// Page texts joined in fetch order; fed verbatim to the generator.
    pub context: String,
}
