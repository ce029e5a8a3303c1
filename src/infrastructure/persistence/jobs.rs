use async_trait::async_trait;
use chrono::Utc;
use sqlx::any::AnyRow;
use sqlx::Row;
use std::time::Duration;
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, Database};
use crate::domain::entities::{
    ActiveStage, AttemptOutcome, CrawledPageRef, Job, JobInput, JobResult, JobState, JobStatus,
    JobUpdate, StatusCounts,
};
use crate::domain::ports::job_repository::JobRepository;
use crate::infrastructure::http::middleware::error::{ApiError, ApiResult};

const JOB_COLUMNS: &str = "id, url, topic, keywords, target_length, status, progress, message, \
     attempts, error, meta_title, meta_description, content_markdown, faq_raw, schema_json, \
     crawled_pages, created_at, updated_at";

const COMPLETE_SET: &str = "SET status = 'completed', progress = 100, message = 'Content generated', \
     error = NULL, meta_title = ?, meta_description = ?, content_markdown = ?, faq_raw = ?, \
     schema_json = ?, crawled_pages = ?, updated_at = ?";

const FAIL_SET: &str = "SET status = 'failed', error = ?, message = ?, meta_title = NULL, \
     meta_description = NULL, content_markdown = NULL, faq_raw = NULL, schema_json = NULL, \
     crawled_pages = NULL, updated_at = ?";

const REQUEUE_SET: &str = "SET status = 'pending', progress = 0, message = ?, updated_at = ?";

const ACTIVE_STATUSES: &str = "('crawling', 'generating', 'parsing')";
const NON_TERMINAL_STATUSES: &str = "('pending', 'crawling', 'generating', 'parsing')";

fn cutoff(age: Duration) -> String {
    let age = chrono::Duration::milliseconds(age.as_millis().min(i64::MAX as u128) as i64);
    format_timestamp(Utc::now() - age)
}

fn decode_err(e: impl std::error::Error + Send + Sync + 'static) -> ApiError {
    ApiError::from(sqlx::Error::Decode(Box::new(e)))
}

fn job_from_row(row: &AnyRow) -> ApiResult<Job> {
    let id: String = row.try_get("id")?;
    let status_str: String = row.try_get("status")?;
    let status = status_str
        .parse::<JobStatus>()
        .map_err(|e| ApiError::Internal(format!("Job {}: {}", id, e)))?;

    let keywords_str: String = row.try_get("keywords")?;
    let keywords: Vec<String> = serde_json::from_str(&keywords_str).map_err(decode_err)?;

    let state = match status {
        JobStatus::Completed => {
            let pages_str: Option<String> = row.try_get("crawled_pages")?;
            let crawled_pages: Vec<CrawledPageRef> = match pages_str {
                Some(s) => serde_json::from_str(&s).map_err(decode_err)?,
                None => Vec::new(),
            };
            let content_markdown: Option<String> = row.try_get("content_markdown")?;
            let content_markdown = content_markdown.ok_or_else(|| {
                ApiError::Internal(format!("Completed job {} has no content", id))
            })?;
            JobState::Completed(JobResult {
                meta_title: row
                    .try_get::<Option<String>, _>("meta_title")?
                    .unwrap_or_default(),
                meta_description: row
                    .try_get::<Option<String>, _>("meta_description")?
                    .unwrap_or_default(),
                content_markdown,
                faq_raw: row
                    .try_get::<Option<String>, _>("faq_raw")?
                    .unwrap_or_default(),
                schema_json: row
                    .try_get::<Option<String>, _>("schema_json")?
                    .unwrap_or_default(),
                crawled_pages,
            })
        }
        JobStatus::Failed => JobState::Failed {
            error: row
                .try_get::<Option<String>, _>("error")?
                .unwrap_or_default(),
        },
        JobStatus::Pending => JobState::InProgress(ActiveStage::Pending),
        JobStatus::Crawling => JobState::InProgress(ActiveStage::Crawling),
        JobStatus::Generating => JobState::InProgress(ActiveStage::Generating),
        JobStatus::Parsing => JobState::InProgress(ActiveStage::Parsing),
    };

    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Job {
        input: JobInput {
            url: row.try_get("url")?,
            topic: row.try_get("topic")?,
            keywords,
            target_length: row.try_get::<i64, _>("target_length")?.clamp(0, u32::MAX as i64)
                as u32,
        },
        state,
        progress: row.try_get::<i64, _>("progress")?.clamp(0, 100) as u8,
        message: row.try_get("message")?,
        attempts: row.try_get::<i64, _>("attempts")?.max(0) as u32,
        created_at: parse_timestamp(&created_at).map_err(decode_err)?,
        updated_at: parse_timestamp(&updated_at).map_err(decode_err)?,
        id,
    })
}

#[async_trait]
impl JobRepository for Database {
    async fn create_job(&self, input: &JobInput) -> ApiResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = format_timestamp(Utc::now());
        let keywords = serde_json::to_string(&input.keywords)
            .map_err(|e| ApiError::Internal(format!("Failed to encode keywords: {}", e)))?;

        sqlx::query(
            "INSERT INTO jobs (id, url, topic, keywords, target_length, status, progress, message,
                               attempts, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'pending', 0, 'Queued', 0, ?, ?)",
        )
        .bind(&id)
        .bind(&input.url)
        .bind(&input.topic)
        .bind(&keywords)
        .bind(input.target_length as i64)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::debug!(job_id = %id, "Inserted job row");
        Ok(id)
    }

    async fn get_job(&self, job_id: &str) -> ApiResult<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn update_job(&self, job_id: &str, update: JobUpdate) -> ApiResult<()> {
        let now = format_timestamp(Utc::now());
        // Terminal rows carry a result or error; a stage write must not revive them.
        let result = sqlx::query(&format!(
            "UPDATE jobs
             SET status = COALESCE(?, status),
                 progress = COALESCE(?, progress),
                 message = COALESCE(?, message),
                 updated_at = ?
             WHERE id = ? AND status IN {}",
            NON_TERMINAL_STATUSES
        ))
        .bind(update.stage.map(|s| s.status().as_str().to_string()))
        .bind(update.progress.map(|p| p.min(100) as i64))
        .bind(update.message)
        .bind(&now)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(job_id = %job_id, "Update skipped: job missing or already terminal");
        }
        Ok(())
    }

    async fn complete_job(&self, job_id: &str, result: &JobResult) -> ApiResult<()> {
        let now = format_timestamp(Utc::now());
        let pages = serde_json::to_string(&result.crawled_pages)
            .map_err(|e| ApiError::Internal(format!("Failed to encode crawled pages: {}", e)))?;

        let updated = sqlx::query(&format!("UPDATE jobs {} WHERE id = ?", COMPLETE_SET))
            .bind(&result.meta_title)
            .bind(&result.meta_description)
            .bind(&result.content_markdown)
            .bind(&result.faq_raw)
            .bind(&result.schema_json)
            .bind(&pages)
            .bind(&now)
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Job {} not found", job_id)));
        }
        Ok(())
    }

    async fn fail_job(&self, job_id: &str, error: &str) -> ApiResult<()> {
        let now = format_timestamp(Utc::now());
        let updated = sqlx::query(&format!("UPDATE jobs {} WHERE id = ?", FAIL_SET))
            .bind(error)
            .bind(error)
            .bind(&now)
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Job {} not found", job_id)));
        }
        Ok(())
    }

    async fn settle_attempt(
        &self,
        job_id: &str,
        attempt: u32,
        outcome: &AttemptOutcome,
    ) -> ApiResult<bool> {
        let now = format_timestamp(Utc::now());
        let guard = format!(
            "WHERE id = ? AND attempts = ? AND status IN {}",
            NON_TERMINAL_STATUSES
        );

        let updated = match outcome {
            AttemptOutcome::Completed(result) => {
                let pages = serde_json::to_string(&result.crawled_pages).map_err(|e| {
                    ApiError::Internal(format!("Failed to encode crawled pages: {}", e))
                })?;
                sqlx::query(&format!("UPDATE jobs {} {}", COMPLETE_SET, guard))
                    .bind(&result.meta_title)
                    .bind(&result.meta_description)
                    .bind(&result.content_markdown)
                    .bind(&result.faq_raw)
                    .bind(&result.schema_json)
                    .bind(pages)
                    .bind(&now)
                    .bind(job_id)
                    .bind(attempt as i64)
                    .execute(&self.pool)
                    .await?
            }
            AttemptOutcome::Requeued { message } => {
                sqlx::query(&format!("UPDATE jobs {} {}", REQUEUE_SET, guard))
                    .bind(message)
                    .bind(&now)
                    .bind(job_id)
                    .bind(attempt as i64)
                    .execute(&self.pool)
                    .await?
            }
            AttemptOutcome::Failed { error } => {
                sqlx::query(&format!("UPDATE jobs {} {}", FAIL_SET, guard))
                    .bind(error)
                    .bind(error)
                    .bind(&now)
                    .bind(job_id)
                    .bind(attempt as i64)
                    .execute(&self.pool)
                    .await?
            }
        };

        if updated.rows_affected() == 0 {
            tracing::warn!(job_id = %job_id, attempt, "Attempt outcome not written: job changed hands");
            return Ok(false);
        }
        Ok(true)
    }

    async fn increment_job_attempt(&self, job_id: &str) -> ApiResult<u32> {
        let now = format_timestamp(Utc::now());
        // RETURNING statements must run to completion before the autocommit
        // lands, so collect every row instead of stopping at the first.
        let rows = sqlx::query(
            "UPDATE jobs SET attempts = attempts + 1, updated_at = ?
             WHERE id = ?
             RETURNING attempts",
        )
        .bind(&now)
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        match rows.first() {
            Some(row) => Ok(row.try_get::<i64, _>("attempts")?.max(0) as u32),
            None => Err(ApiError::NotFound(format!("Job {} not found", job_id))),
        }
    }

    async fn get_next_pending_job(&self) -> ApiResult<Option<String>> {
        let now = format_timestamp(Utc::now());

        // Select and claim in one statement: a second runner racing on the
        // same row finds it no longer pending and matches nothing.
        let rows = sqlx::query(
            "UPDATE jobs
             SET status = 'crawling', progress = 0, message = 'Claimed by worker', updated_at = ?
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE status = 'pending'
                 ORDER BY created_at ASC, id ASC
                 LIMIT 1
             )
             AND status = 'pending'
             RETURNING id",
        )
        .bind(&now)
        .fetch_all(&self.pool)
        .await?;

        match rows.first() {
            Some(row) => {
                let id: String = row.try_get("id")?;
                tracing::debug!(job_id = %id, "Claimed pending job");
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    async fn reset_stuck_jobs(&self, stale_threshold: Duration) -> ApiResult<u64> {
        let now = format_timestamp(Utc::now());
        let result = sqlx::query(&format!(
            "UPDATE jobs
             SET status = 'pending', progress = 0,
                 message = 'Recovered after stalling while ' || status,
                 updated_at = ?
             WHERE status IN {} AND updated_at < ?",
            ACTIVE_STATUSES
        ))
        .bind(&now)
        .bind(cutoff(stale_threshold))
        .execute(&self.pool)
        .await?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::warn!(count, "Reset stuck jobs to pending");
        }
        Ok(count)
    }

    async fn cleanup_old_jobs(&self, max_age: Duration) -> ApiResult<u64> {
        let result = sqlx::query("DELETE FROM jobs WHERE created_at < ?")
            .bind(cutoff(max_age))
            .execute(&self.pool)
            .await?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::info!(count, "Deleted old jobs");
        }
        Ok(count)
    }

    async fn list_jobs(&self, status: Option<JobStatus>, limit: i64) -> ApiResult<Vec<Job>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {} FROM jobs WHERE status = ?
                     ORDER BY created_at DESC, id DESC LIMIT ?",
                    JOB_COLUMNS
                ))
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM jobs ORDER BY created_at DESC, id DESC LIMIT ?",
                    JOB_COLUMNS
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(job_from_row).collect()
    }

    async fn reset_job(&self, job_id: &str) -> ApiResult<bool> {
        let now = format_timestamp(Utc::now());
        let result = sqlx::query(
            "UPDATE jobs
             SET status = 'pending', progress = 0, attempts = 0, message = 'Manually reset',
                 error = NULL,
                 meta_title = NULL, meta_description = NULL, content_markdown = NULL,
                 faq_raw = NULL, schema_json = NULL, crawled_pages = NULL,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(&now)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_by_status(&self) -> ApiResult<StatusCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            match status.parse::<JobStatus>() {
                Ok(status) => counts.set(status, count),
                Err(e) => tracing::warn!("Ignoring row with {}", e),
            }
        }
        Ok(counts)
    }

    async fn count_stuck(&self, stale_threshold: Duration) -> ApiResult<i64> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS count FROM jobs WHERE status IN {} AND updated_at < ?",
            ACTIVE_STATUSES
        ))
        .bind(cutoff(stale_threshold))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("count")?)
    }
}
