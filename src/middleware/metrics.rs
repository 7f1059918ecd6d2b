use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::handlers::AppState;

/// Records count and latency per route template, so `/api/medications/:id/logs`
/// is one series regardless of the id.
pub async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    state
        .metrics
        .record_request(&method, &route, response.status().as_u16(), start.elapsed());

    response
}
