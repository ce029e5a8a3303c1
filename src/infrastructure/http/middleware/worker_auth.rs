use axum::{
    extract::{Request, State},
    http::header::{HeaderMap, AUTHORIZATION},
    middleware::Next,
    response::Response,
};

use crate::infrastructure::http::middleware::{ApiError, AppState};

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Guard worker routes with `CRON_SECRET`. Open when no secret is configured.
pub async fn require_cron_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(secret) = state.cron_secret.as_deref() {
        match bearer_token(request.headers()) {
            Some(token) if token == secret => {}
            _ => {
                tracing::warn!(path = %request.uri().path(), "Rejected worker request without valid secret");
                return Err(ApiError::Unauthorized);
            }
        }
    }

    Ok(next.run(request).await)
}
