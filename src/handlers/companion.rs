use axum::{extract::State, response::Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
    middleware::AuthenticatedUser,
    services::PatientContext,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompanionRequest {
    pub message: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompanionResponse {
    pub response: String,
    pub tokens_remaining: i32,
}

#[utoipa::path(
    post,
    path = "/api/ai/health-companion",
    request_body = CompanionRequest,
    responses(
        (status = 200, description = "Companion reply", body = CompanionResponse),
        (status = 400, description = "Empty message"),
        (status = 429, description = "Usage quota exhausted"),
        (status = 502, description = "Chat model unavailable")
    ),
    tag = "companion"
)]
pub async fn ask(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CompanionRequest>,
) -> Result<Json<CompanionResponse>> {
    let message = request
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::validation("Message is required"))?;

    let cost = state.config.companion_request_cost;
    let now = Utc::now();
    let quota = state.usage_meter.current(user.id, now).await?;
    if quota.tokens_remaining < cost {
        state.metrics.record_companion("exhausted");
        warn!("Companion request rejected for user {}: quota exhausted", user.id);
        return Err(AppError::QuotaExhausted { remaining: quota.tokens_remaining, required: cost });
    }

    let context = PatientContext::gather(&state.database, user.id, now).await?;
    let reply = match state.companion.reply(&context.system_prompt()?, message).await {
        Ok(reply) => reply,
        Err(e) => {
            state.metrics.record_companion("failed");
            return Err(e);
        }
    };

    // a concurrent request may have drained the quota while the model was answering
    let quota = match state.usage_meter.try_consume(&quota, cost).await {
        Ok(quota) => quota,
        Err(e) => {
            state.metrics.record_companion("exhausted");
            return Err(e);
        }
    };

    state.metrics.record_companion("answered");
    info!("Companion answered user {}, {} tokens left", user.id, quota.tokens_remaining);

    Ok(Json(CompanionResponse { response: reply, tokens_remaining: quota.tokens_remaining }))
}
