use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use seoscribe::application::services::{ContentGenerator, JobRunner, JobService};
use seoscribe::config::{CrawlSettings, GenerationSettings, QueueSettings};
use seoscribe::domain::entities::{CrawlOptions, CrawlOutput, CrawledPage, JobInput};
use seoscribe::domain::ports::job_repository::JobRepository;
use seoscribe::domain::ports::llm_provider::{CompletionRequest, GenerationError, LlmProvider};
use seoscribe::domain::ports::site_crawler::{CrawlError, SiteCrawler};
use seoscribe::infrastructure::http::middleware::AppState;
use seoscribe::infrastructure::persistence::Database;

pub const VALID_DRAFT: &str = r#"META_TITLE: Benefits of X | Example Co
META_DESCRIPTION: Discover the benefits of X for y and z.
CONTENT:
# Benefits of X

X helps teams with y and z every day.
FAQ:
Q: What is X?
A: X is a tool.
SCHEMA:
```json
{"@context":"https://schema.org","@type":"FAQPage"}
```
"#;

pub const DRAFT_WITHOUT_DESCRIPTION: &str = "META_TITLE: Benefits of X\nCONTENT:\nX helps teams.";

pub fn sample_input() -> JobInput {
    JobInput {
        url: "https://example.com".to_string(),
        topic: "Benefits of X".to_string(),
        keywords: vec!["x".to_string(), "y".to_string(), "z".to_string()],
        target_length: 800,
    }
}

/// Crawler returning a fixed single-page site, or a seed failure.
pub struct FakeCrawler {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeCrawler {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SiteCrawler for FakeCrawler {
    async fn crawl(&self, seed_url: &str, _options: &CrawlOptions) -> Result<CrawlOutput, CrawlError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CrawlError::SeedUnreachable(format!("{}: HTTP 503", seed_url)));
        }
        let page = CrawledPage {
            title: "Example Co".to_string(),
            url: seed_url.to_string(),
            text: "Example Co sells X to teams who need y and z.".to_string(),
        };
        Ok(CrawlOutput {
            context: format!("## {} ({})\n{}", page.title, page.url, page.text),
            pages: vec![page],
        })
    }
}

/// LLM that always answers with the same text.
pub struct FakeLlm {
    pub reply: String,
    pub calls: AtomicUsize,
}

impl FakeLlm {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LlmProvider for FakeLlm {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

pub fn test_generation_settings() -> GenerationSettings {
    GenerationSettings {
        timeout: Duration::from_secs(2),
        max_refinements: 0,
        ..GenerationSettings::default()
    }
}

pub fn build_runner(
    db: &Database,
    crawler: Arc<dyn SiteCrawler>,
    llm: Arc<dyn LlmProvider>,
) -> Arc<JobRunner> {
    let jobs: Arc<dyn JobRepository> = Arc::new(db.clone());
    Arc::new(JobRunner::new(
        jobs,
        crawler,
        ContentGenerator::new(llm, test_generation_settings()),
        CrawlSettings::default(),
        QueueSettings::default(),
    ))
}

/// Router state wired to the fakes, optionally guarding `/worker/*`.
pub fn build_state(db: &Database, cron_secret: Option<&str>) -> AppState {
    let jobs: Arc<dyn JobRepository> = Arc::new(db.clone());
    AppState {
        job_service: JobService::new(jobs),
        runner: build_runner(db, FakeCrawler::ok(), FakeLlm::replying(VALID_DRAFT)),
        cron_secret: cron_secret.map(str::to_string),
    }
}
