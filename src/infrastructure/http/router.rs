use crate::infrastructure::http::controllers::{self, jobs, worker};
use crate::infrastructure::http::middleware::{require_cron_secret, AppState};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    // Worker routes (guarded by CRON_SECRET when configured)
    let worker_routes = Router::new()
        .route("/worker/run", post(worker::run_worker))
        .route("/worker/health", get(worker::worker_health))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_cron_secret,
        ));

    let job_routes = Router::new()
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job))
        .route("/jobs/:id/reset", post(jobs::reset_job));

    Router::new()
        .route("/health", get(controllers::health))
        .merge(job_routes)
        .merge(worker_routes)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
