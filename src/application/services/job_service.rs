use std::sync::Arc;
use std::time::Duration;

use crate::domain::entities::{Job, JobStatus, StatusCounts};
use crate::domain::ports::job_repository::JobRepository;
use crate::domain::services::CreateJobRequest;
use crate::infrastructure::http::middleware::error::{ApiError, ApiResult};

pub const DEFAULT_LIST_LIMIT: i64 = 20;
pub const MAX_LIST_LIMIT: i64 = 100;
const RECENT_JOBS_IN_HEALTH: i64 = 10;

/// Queue overview returned by the worker health endpoint.
#[derive(Debug, Clone)]
pub struct QueueHealth {
    pub counts: StatusCounts,
    pub stuck: i64,
    pub recent: Vec<Job>,
}

#[derive(Clone)]
pub struct JobService {
    jobs: Arc<dyn JobRepository>,
}

impl JobService {
    pub fn new(jobs: Arc<dyn JobRepository>) -> Self {
        Self { jobs }
    }

    /// Validate a submission and enqueue it; returns the new job ID.
    pub async fn create_job(&self, request: &CreateJobRequest) -> ApiResult<String> {
        let input = request.validate()?;
        let job_id = self.jobs.create_job(&input).await?;

        metrics::counter!("jobs_created_total").increment(1);
        tracing::info!(
            job_id = %job_id,
            url = %input.url,
            keywords = input.keywords.len(),
            target_length = input.target_length,
            "Job created"
        );
        Ok(job_id)
    }

    pub async fn get_job(&self, job_id: &str) -> ApiResult<Job> {
        self.jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Job {} not found", job_id)))
    }

    pub async fn list_jobs(
        &self,
        status: Option<&str>,
        limit: Option<i64>,
    ) -> ApiResult<Vec<Job>> {
        let status = match status.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(raw.parse::<JobStatus>().map_err(ApiError::BadRequest)?),
            None => None,
        };
        let limit = limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        self.jobs.list_jobs(status, limit).await
    }

    /// Force a job back to pending with attempts and progress cleared.
    pub async fn reset_job(&self, job_id: &str) -> ApiResult<Job> {
        if !self.jobs.reset_job(job_id).await? {
            return Err(ApiError::NotFound(format!("Job {} not found", job_id)));
        }
        tracing::info!(job_id = %job_id, "Job manually reset");
        self.get_job(job_id).await
    }

    pub async fn queue_health(&self, stuck_threshold: Duration) -> ApiResult<QueueHealth> {
        let counts = self.jobs.count_by_status().await?;
        let stuck = self.jobs.count_stuck(stuck_threshold).await?;
        let recent = self.jobs.list_jobs(None, RECENT_JOBS_IN_HEALTH).await?;
        Ok(QueueHealth {
            counts,
            stuck,
            recent,
        })
    }
}
