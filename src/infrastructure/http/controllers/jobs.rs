use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderName, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::entities::{Job, JobResult, JobStatus};
use crate::domain::services::CreateJobRequest;
use crate::infrastructure::http::middleware::{ApiResult, AppState};
use crate::infrastructure::persistence::format_timestamp;

/// Polled job records must never be served from a cache.
pub const NO_STORE: [(HeaderName, &str); 3] = [
    (
        header::CACHE_CONTROL,
        "no-store, no-cache, must-revalidate, max-age=0",
    ),
    (header::PRAGMA, "no-cache"),
    (header::EXPIRES, "0"),
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub id: String,
    pub url: String,
    pub topic: String,
    pub keywords: Vec<String>,
    pub length: u32,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        let status = job.status();
        let error = job.error().map(str::to_string);
        let result = job.result().cloned();
        Self {
            id: job.id,
            url: job.input.url,
            topic: job.input.topic,
            keywords: job.input.keywords,
            length: job.input.target_length,
            status,
            progress: job.progress,
            message: job.message,
            attempts: job.attempts,
            error,
            result,
            created_at: format_timestamp(job.created_at),
            updated_at: format_timestamp(job.updated_at),
        }
    }
}

/// Compact listing entry without the generated content.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: String,
    pub url: String,
    pub topic: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub attempts: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Job> for JobSummary {
    fn from(job: Job) -> Self {
        let status = job.status();
        Self {
            id: job.id,
            url: job.input.url,
            topic: job.input.topic,
            status,
            progress: job.progress,
            message: job.message,
            attempts: job.attempts,
            created_at: format_timestamp(job.created_at),
            updated_at: format_timestamp(job.updated_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn create_job(
    State(state): State<AppState>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreateJobResponse>)> {
    let Json(request) = payload?;
    let job_id = state.job_service.create_job(&request).await?;
    Ok((StatusCode::CREATED, Json(CreateJobResponse { job_id })))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<([(HeaderName, &'static str); 3], Json<JobResponse>)> {
    let job = state.job_service.get_job(&id).await?;
    Ok((NO_STORE, Json(JobResponse::from(job))))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<([(HeaderName, &'static str); 3], Json<Vec<JobSummary>>)> {
    let jobs = state
        .job_service
        .list_jobs(query.status.as_deref(), query.limit)
        .await?;
    let summaries = jobs.into_iter().map(JobSummary::from).collect();
    Ok((NO_STORE, Json(summaries)))
}

pub async fn reset_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let job = state.job_service.reset_job(&id).await?;
    Ok(Json(JobResponse::from(job)))
}
