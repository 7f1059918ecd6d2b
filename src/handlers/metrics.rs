use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
};

use crate::{errors::Result, handlers::AppState};

#[utoipa::path(
    get,
    path = "/metrics",
    responses((status = 200, description = "Prometheus text exposition", content_type = "text/plain")),
    tag = "health"
)]
pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
