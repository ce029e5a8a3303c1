use crate::domain::entities::{
    AttemptOutcome, Job, JobInput, JobResult, JobStatus, JobUpdate, StatusCounts,
};
use crate::infrastructure::http::middleware::error::ApiResult;
use async_trait::async_trait;
use std::time::Duration;

/// Persistence for content jobs. Every read goes straight to the database so
/// pollers observe the latest write.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a pending job with progress 0 and attempts 0; returns its ID.
    async fn create_job(&self, input: &JobInput) -> ApiResult<String>;

    async fn get_job(&self, job_id: &str) -> ApiResult<Option<Job>>;

    /// Merge stage/progress/message and refresh `updated_at`.
    async fn update_job(&self, job_id: &str, update: JobUpdate) -> ApiResult<()>;

    /// Mark completed at progress 100, store the result, clear any error.
    async fn complete_job(&self, job_id: &str, result: &JobResult) -> ApiResult<()>;

    /// Mark failed with `error`, clear any result.
    async fn fail_job(&self, job_id: &str, error: &str) -> ApiResult<()>;

    /// Write the end of attempt `attempt`, but only while the job is still
    /// non-terminal and its counter still equals `attempt`. Returns false
    /// when a reset, recovery or newer run has taken the job over.
    async fn settle_attempt(
        &self,
        job_id: &str,
        attempt: u32,
        outcome: &AttemptOutcome,
    ) -> ApiResult<bool>;

    /// Bump the attempt counter; returns the new value.
    async fn increment_job_attempt(&self, job_id: &str) -> ApiResult<u32>;

    /// Atomically claim the oldest pending job, moving it out of `pending`.
    /// Concurrent callers never receive the same ID.
    async fn get_next_pending_job(&self) -> ApiResult<Option<String>>;

    /// Return jobs idle in crawling, generating or parsing for longer than
    /// `stale_threshold` to pending with progress 0; attempts are kept.
    /// Pending rows are left alone: they are already waiting for a runner.
    async fn reset_stuck_jobs(&self, stale_threshold: Duration) -> ApiResult<u64>;

    /// Delete jobs created more than `max_age` ago, in any state.
    async fn cleanup_old_jobs(&self, max_age: Duration) -> ApiResult<u64>;

    /// Newest first, optionally filtered by status.
    async fn list_jobs(&self, status: Option<JobStatus>, limit: i64) -> ApiResult<Vec<Job>>;

    /// Force a job back to pending with attempts and progress at 0.
    /// Returns false when the job does not exist.
    async fn reset_job(&self, job_id: &str) -> ApiResult<bool>;

    async fn count_by_status(&self) -> ApiResult<StatusCounts>;

    /// Jobs that `reset_stuck_jobs` would recover.
    async fn count_stuck(&self, stale_threshold: Duration) -> ApiResult<i64>;
}
