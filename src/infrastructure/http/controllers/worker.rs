use axum::{
    extract::{Query, State},
    http::{HeaderName, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::application::services::{RunOutcome, RunReport};
use crate::domain::entities::StatusCounts;
use crate::infrastructure::http::controllers::jobs::{JobSummary, NO_STORE};
use crate::infrastructure::http::middleware::{ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct RunWorkerParams {
    #[serde(default, rename = "jobId", alias = "job_id")]
    pub job_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerHealthResponse {
    pub status: &'static str,
    pub counts: StatusCounts,
    pub pending: i64,
    pub active: i64,
    pub stuck: i64,
    pub stuck_threshold_ms: u64,
    pub recent: Vec<JobSummary>,
}

/// One queue-drain invocation. A job ID in the query string or JSON body
/// forces that job instead of claiming the oldest pending one.
pub async fn run_worker(
    State(state): State<AppState>,
    Query(params): Query<RunWorkerParams>,
    body: Option<Json<RunWorkerParams>>,
) -> ApiResult<(StatusCode, Json<RunReport>)> {
    let forced = params
        .job_id
        .or_else(|| body.and_then(|Json(b)| b.job_id))
        .filter(|id| !id.trim().is_empty());

    let report = state.runner.run_once(forced.as_deref()).await?;
    // Stage failures are recorded on the job; only an unknown forced ID is
    // reported as an error status.
    let status = match report.outcome {
        RunOutcome::NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    };
    Ok((status, Json(report)))
}

pub async fn worker_health(
    State(state): State<AppState>,
) -> ApiResult<([(HeaderName, &'static str); 3], Json<WorkerHealthResponse>)> {
    let threshold = state.runner.queue_settings().stuck_threshold;
    let health = state.job_service.queue_health(threshold).await?;

    let status = if health.stuck > 0 { "degraded" } else { "ok" };
    let response = WorkerHealthResponse {
        status,
        pending: health.counts.pending,
        active: health.counts.active(),
        counts: health.counts,
        stuck: health.stuck,
        stuck_threshold_ms: threshold.as_millis() as u64,
        recent: health.recent.into_iter().map(JobSummary::from).collect(),
    };
    Ok((NO_STORE, Json(response)))
}
