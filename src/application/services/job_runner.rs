use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn, Instrument};

use crate::application::services::content_generator::ContentGenerator;
use crate::config::{CrawlSettings, QueueSettings};
use crate::domain::entities::{ActiveStage, AttemptOutcome, Job, JobResult, JobUpdate};
use crate::domain::ports::job_repository::JobRepository;
use crate::domain::ports::llm_provider::GenerationError;
use crate::domain::ports::site_crawler::{CrawlError, SiteCrawler};
use crate::domain::services::section_parser::{self, ParseError};
use crate::infrastructure::http::middleware::error::{ApiError, ApiResult};

/// Longest error excerpt embedded in a retry message.
const RETRY_ERROR_EXCERPT: usize = 200;

/// Stage failures, unified at the runner boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Crawl failed: {0}")]
    Crawl(#[from] CrawlError),
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("Parse failed: {0}")]
    Parse(#[from] ParseError),
    #[error("Store error: {0}")]
    Store(#[from] ApiError),
    /// Another invocation took over the job (reset, recovered or deleted).
    #[error("Job superseded: {0}")]
    Superseded(String),
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Crawl(_) => "crawling",
            PipelineError::Generation(_) => "generating",
            PipelineError::Parse(_) => "parsing",
            PipelineError::Store(_) => "store",
            PipelineError::Superseded(_) => "superseded",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub reset_stuck: u64,
    pub deleted_old: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum RunOutcome {
    /// No pending job was available.
    Idle,
    #[serde(rename_all = "camelCase")]
    NotFound { job_id: String },
    #[serde(rename_all = "camelCase")]
    Completed { job_id: String, attempts: u32 },
    #[serde(rename_all = "camelCase")]
    Retrying {
        job_id: String,
        attempts: u32,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        job_id: String,
        attempts: u32,
        error: String,
    },
    /// The job changed hands mid-run; nothing was written.
    #[serde(rename_all = "camelCase")]
    Abandoned { job_id: String, reason: String },
}

impl RunOutcome {
    pub fn processed_job(&self) -> bool {
        !matches!(self, RunOutcome::Idle)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub maintenance: MaintenanceReport,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

/// Drives one job through crawl, generation and parsing per invocation.
pub struct JobRunner {
    jobs: Arc<dyn JobRepository>,
    crawler: Arc<dyn SiteCrawler>,
    generator: ContentGenerator,
    crawl: CrawlSettings,
    queue: QueueSettings,
}

impl JobRunner {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        crawler: Arc<dyn SiteCrawler>,
        generator: ContentGenerator,
        crawl: CrawlSettings,
        queue: QueueSettings,
    ) -> Self {
        Self {
            jobs,
            crawler,
            generator,
            crawl,
            queue,
        }
    }

    pub fn queue_settings(&self) -> &QueueSettings {
        &self.queue
    }

    /// Run maintenance, then process at most one job: the forced one if
    /// given, otherwise the oldest pending job. Stage failures become job
    /// state transitions; only store failures outside a job surface as `Err`.
    pub async fn run_once(&self, forced_job_id: Option<&str>) -> ApiResult<RunReport> {
        let maintenance = self.maintenance().await?;

        let job_id = match forced_job_id {
            Some(id) => {
                info!(job_id = %id, "Processing forced job");
                Some(id.to_string())
            }
            None => self.jobs.get_next_pending_job().await?,
        };

        let outcome = match job_id {
            Some(job_id) => {
                let span = tracing::info_span!("job", job_id = %job_id);
                self.process(job_id, forced_job_id.is_some())
                    .instrument(span)
                    .await?
            }
            None => RunOutcome::Idle,
        };

        Ok(RunReport {
            maintenance,
            outcome,
        })
    }

    pub async fn maintenance(&self) -> ApiResult<MaintenanceReport> {
        let reset_stuck = self
            .jobs
            .reset_stuck_jobs(self.queue.stuck_threshold)
            .await?;
        let deleted_old = self.jobs.cleanup_old_jobs(self.queue.retention).await?;

        if reset_stuck > 0 || deleted_old > 0 {
            info!(reset_stuck, deleted_old, "Queue maintenance");
        }
        Ok(MaintenanceReport {
            reset_stuck,
            deleted_old,
        })
    }

    async fn process(&self, job_id: String, forced: bool) -> ApiResult<RunOutcome> {
        let Some(mut job) = self.jobs.get_job(&job_id).await? else {
            warn!("Job not found");
            return Ok(RunOutcome::NotFound { job_id });
        };

        if forced && job.is_terminal() {
            info!(status = %job.status(), "Restarting terminal job on request");
            self.jobs.reset_job(&job_id).await?;
            job = match self.jobs.get_job(&job_id).await? {
                Some(job) => job,
                None => return Ok(RunOutcome::NotFound { job_id }),
            };
        }

        let max_retries = self.queue.max_retries;
        if job.attempts >= max_retries {
            // The last allowed attempt stalled and was recovered.
            let error = format!(
                "Failed after {} attempts: {}",
                job.attempts, job.message
            );
            let outcome = AttemptOutcome::Failed {
                error: error.clone(),
            };
            if !self.jobs.settle_attempt(&job_id, job.attempts, &outcome).await? {
                return Ok(abandoned(job_id, job.attempts));
            }
            metrics::counter!("jobs_failed_total").increment(1);
            error!(attempts = job.attempts, "Retries exhausted before start");
            return Ok(RunOutcome::Failed {
                job_id,
                attempts: job.attempts,
                error,
            });
        }

        let attempt = self.jobs.increment_job_attempt(&job_id).await?;
        info!(attempt, max_retries, url = %job.input.url, "Starting attempt");

        match self.execute(&job, attempt).await {
            Ok(result) => {
                let pages = result.crawled_pages.len();
                let outcome = AttemptOutcome::Completed(result);
                if !self.jobs.settle_attempt(&job_id, attempt, &outcome).await? {
                    return Ok(abandoned(job_id, attempt));
                }
                metrics::counter!("jobs_completed_total").increment(1);
                info!(attempt, pages, "Job completed");
                Ok(RunOutcome::Completed {
                    job_id,
                    attempts: attempt,
                })
            }
            Err(PipelineError::Superseded(reason)) => {
                warn!(reason = %reason, "Abandoning job");
                Ok(RunOutcome::Abandoned { job_id, reason })
            }
            Err(err) => self.handle_failure(job_id, attempt, err).await,
        }
    }

    async fn execute(&self, job: &Job, attempt: u32) -> Result<JobResult, PipelineError> {
        let input = &job.input;

        self.advance(
            &job.id,
            attempt,
            JobUpdate::stage(ActiveStage::Crawling, 10, format!("Crawling {}", input.url)),
        )
        .await?;
        let crawl = self
            .crawler
            .crawl(&input.url, &self.crawl.options())
            .await?;
        self.advance(
            &job.id,
            attempt,
            JobUpdate::progress(30, format!("Crawled {} pages", crawl.pages.len())),
        )
        .await?;

        self.advance(
            &job.id,
            attempt,
            JobUpdate::stage(ActiveStage::Generating, 40, "Generating content"),
        )
        .await?;
        let raw = self
            .generator
            .generate(
                &crawl.context,
                &input.topic,
                &input.keywords,
                input.target_length,
            )
            .await?;
        self.advance(
            &job.id,
            attempt,
            JobUpdate::progress(
                80,
                format!("Generated {} words", section_parser::body_word_count(&raw)),
            ),
        )
        .await?;

        self.advance(
            &job.id,
            attempt,
            JobUpdate::stage(ActiveStage::Parsing, 90, "Parsing sections"),
        )
        .await?;
        let parsed = section_parser::parse(&raw)?;

        Ok(JobResult {
            meta_title: parsed.meta_title,
            meta_description: parsed.meta_description,
            content_markdown: parsed.content_markdown,
            faq_raw: parsed.faq_raw,
            schema_json: parsed.schema_json,
            crawled_pages: crawl.pages.iter().map(|p| p.to_ref()).collect(),
        })
    }

    /// Re-read the job and write the update only while this attempt still
    /// owns it.
    async fn advance(
        &self,
        job_id: &str,
        attempt: u32,
        update: JobUpdate,
    ) -> Result<(), PipelineError> {
        self.ensure_owned(job_id, attempt).await?;
        self.jobs.update_job(job_id, update).await?;
        Ok(())
    }

    /// The attempt counter doubles as an ownership token: a reset or a
    /// second runner changes it.
    async fn ensure_owned(&self, job_id: &str, attempt: u32) -> Result<(), PipelineError> {
        match self.jobs.get_job(job_id).await? {
            None => Err(PipelineError::Superseded("job was deleted".to_string())),
            Some(job) if job.is_terminal() => Err(PipelineError::Superseded(format!(
                "job is already {}",
                job.status()
            ))),
            Some(job) if job.attempts != attempt => Err(PipelineError::Superseded(format!(
                "attempt {} replaced by attempt {}",
                attempt, job.attempts
            ))),
            Some(_) => Ok(()),
        }
    }

    async fn handle_failure(
        &self,
        job_id: String,
        attempt: u32,
        err: PipelineError,
    ) -> ApiResult<RunOutcome> {
        let max_retries = self.queue.max_retries;
        let error = err.to_string();

        if attempt < max_retries {
            let message = format!(
                "Attempt {}/{} failed: {}, will retry",
                attempt,
                max_retries,
                truncate(&error, RETRY_ERROR_EXCERPT)
            );
            let outcome = AttemptOutcome::Requeued { message };
            if !self.jobs.settle_attempt(&job_id, attempt, &outcome).await? {
                return Ok(abandoned(job_id, attempt));
            }
            metrics::counter!("jobs_retried_total").increment(1);
            warn!(attempt, stage = err.stage(), error = %error, "Attempt failed; job requeued");
            Ok(RunOutcome::Retrying {
                job_id,
                attempts: attempt,
                error,
            })
        } else {
            let message = format!("Failed after {} attempts: {}", attempt, error);
            let outcome = AttemptOutcome::Failed {
                error: message.clone(),
            };
            if !self.jobs.settle_attempt(&job_id, attempt, &outcome).await? {
                return Ok(abandoned(job_id, attempt));
            }
            metrics::counter!("jobs_failed_total").increment(1);
            error!(attempt, stage = err.stage(), error = %error, "Job failed permanently");
            Ok(RunOutcome::Failed {
                job_id,
                attempts: attempt,
                error: message,
            })
        }
    }
}

/// Another run, a reset or a recovery moved the job on while this attempt
/// was in flight, so its outcome was discarded.
fn abandoned(job_id: String, attempt: u32) -> RunOutcome {
    let reason = format!("attempt {} no longer owns the job", attempt);
    warn!(reason = %reason, "Abandoning job");
    RunOutcome::Abandoned { job_id, reason }
}

fn truncate(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[test]
    fn test_report_serializes_flat() {
        let report = RunReport {
            maintenance: MaintenanceReport::default(),
            outcome: RunOutcome::Completed {
                job_id: "j1".to_string(),
                attempts: 1,
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "completed");
        assert_eq!(json["jobId"], "j1");
        assert_eq!(json["attempts"], 1);
        assert_eq!(json["maintenance"]["resetStuck"], 0);
    }

    #[test]
    fn test_pipeline_error_messages_keep_category_words() {
        let err = PipelineError::from(GenerationError::RateLimited("slow down".into()));
        assert!(err.to_string().contains("rate limit"));
        assert_eq!(err.stage(), "generating");
        let err = PipelineError::from(ParseError::MissingSection("META_DESCRIPTION"));
        assert!(err.to_string().contains("META_DESCRIPTION"));
    }
}
