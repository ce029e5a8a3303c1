use crate::application::services::{ContentGenerator, JobRunner, JobService};
use crate::config::Config;
use crate::domain::ports::job_repository::JobRepository;
use crate::domain::ports::llm_provider::LlmProvider;
use crate::domain::ports::site_crawler::{PageFetcher, SiteCrawler};
use crate::domain::ports::time_service::TimeService;
use crate::infrastructure::http::middleware::AppState;
use crate::infrastructure::persistence::Database;
use crate::infrastructure::providers::{HttpPageFetcher, OpenAiProvider, WebCrawler};
use crate::infrastructure::runtime::tokio::TokioTimeService;
use crate::infrastructure::workers::JobWorker;
use std::sync::Arc;

pub async fn build_app_state(
    db: Database,
    config: &Config,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let jobs: Arc<dyn JobRepository> = Arc::new(db);

    // Initialize providers
    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpPageFetcher::new()?);
    let crawler: Arc<dyn SiteCrawler> = Arc::new(WebCrawler::new(fetcher));
    tracing::info!(
        max_pages = config.crawl.max_pages,
        concurrency = config.crawl.concurrency,
        timeout_ms = config.crawl.timeout.as_millis() as u64,
        "Crawler initialized"
    );

    let llm: Arc<dyn LlmProvider> = Arc::new(
        OpenAiProvider::new(
            config.openai_api_key.clone(),
            config.generation.model.clone(),
            config.generation.timeout,
        )
        .with_base_url(config.openai_base_url.clone()),
    );
    tracing::info!(model = %config.generation.model, "LLM provider initialized");

    let generator = ContentGenerator::new(llm, config.generation.clone());
    let runner = Arc::new(JobRunner::new(
        jobs.clone(),
        crawler,
        generator,
        config.crawl.clone(),
        config.queue.clone(),
    ));
    let job_service = JobService::new(jobs);

    // Optional in-process scheduler
    if let Some(interval) = config.worker_interval {
        let time_service = Arc::new(TokioTimeService::new()) as Arc<dyn TimeService>;
        let worker = JobWorker::new(runner.clone(), interval, time_service);
        tokio::spawn(async move {
            worker.run().await;
        });
        tracing::info!(interval_secs = interval.as_secs(), "Job worker started");
    } else {
        tracing::info!("No WORKER_INTERVAL_SECS set; relying on external /worker/run triggers");
    }

    if config.cron_secret.is_none() {
        tracing::warn!("CRON_SECRET not set; /worker endpoints are unauthenticated");
    }

    Ok(AppState {
        job_service,
        runner,
        cron_secret: config.cron_secret.clone(),
    })
}
