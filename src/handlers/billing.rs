use axum::{extract::State, response::Json};
use chrono::{DateTime, Months, Utc};
use serde_json::json;
use tracing::info;

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
    middleware::AuthenticatedUser,
    models::{
        BillingPeriod, CheckoutRequest, ConfirmCheckoutRequest, Plan, SubscriptionResponse,
        UsageQuota,
    },
};

fn subscription_view(quota: &UsageQuota, now: DateTime<Utc>) -> SubscriptionResponse {
    SubscriptionResponse {
        plan: quota.plan,
        status: Some(quota.status.clone()),
        current_period_end: quota.current_period_end,
        tokens_remaining: quota.tokens_remaining,
        tokens_total: quota.tokens_allotted,
        resets_at: quota.plan.cadence().next_boundary(now),
    }
}

#[utoipa::path(
    get,
    path = "/api/subscription",
    responses((status = 200, description = "Plan and remaining usage", body = SubscriptionResponse)),
    tag = "billing"
)]
pub async fn subscription(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<SubscriptionResponse>> {
    let now = Utc::now();
    let Some(quota) = state.database.quotas().find_quota(user.id).await? else {
        // nothing is persisted until the first companion request
        let allotment = state.usage_meter.policy().allotment(Plan::Free);
        return Ok(Json(SubscriptionResponse {
            plan: Plan::Free,
            status: None,
            current_period_end: None,
            tokens_remaining: allotment,
            tokens_total: allotment,
            resets_at: Plan::Free.cadence().next_boundary(now),
        }));
    };

    let quota = state.usage_meter.reset_if_due(quota, now).await?;
    Ok(Json(subscription_view(&quota, now)))
}

#[utoipa::path(
    post,
    path = "/api/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Checkout URL, or success for the free plan"),
        (status = 400, description = "Invalid plan or period"),
        (status = 502, description = "Payment provider unavailable")
    ),
    tag = "billing"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<serde_json::Value>> {
    let invalid = || AppError::validation("Invalid plan or period");
    let plan: Plan = request
        .plan_id
        .as_deref()
        .ok_or_else(invalid)?
        .parse()
        .map_err(|_| invalid())?;

    if plan == Plan::Free {
        state.usage_meter.apply_plan(user.id, Plan::Free, None, Utc::now()).await?;
        return Ok(Json(json!({ "success": true })));
    }

    let period: BillingPeriod = request
        .period
        .as_deref()
        .ok_or_else(invalid)?
        .parse()
        .map_err(|_| invalid())?;

    let url = state.payments.create_checkout(user.id, plan, period).await?;
    info!("Started {} {} checkout for user {}", plan.as_str(), period.as_str(), user.id);

    Ok(Json(json!({ "url": url })))
}

#[utoipa::path(
    post,
    path = "/api/checkout/confirm",
    request_body = ConfirmCheckoutRequest,
    responses(
        (status = 200, description = "Plan applied, or current plan if the session was already applied", body = SubscriptionResponse),
        (status = 400, description = "Session not paid"),
        (status = 403, description = "Session belongs to another user")
    ),
    tag = "billing"
)]
pub async fn confirm_checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<ConfirmCheckoutRequest>,
) -> Result<Json<SubscriptionResponse>> {
    let session = state.payments.fetch_session(&request.session_id).await?;
    if session.user_id != user.id {
        return Err(AppError::Forbidden);
    }
    if !session.paid {
        return Err(AppError::validation("Checkout session has not been paid"));
    }

    let now = Utc::now();
    let period_end = now
        .checked_add_months(Months::new(session.period.months()))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Billing period end out of range")))?;

    // a session is applied once; confirming it again only reports the current plan
    let applied = state
        .usage_meter
        .apply_checkout(&session.id, user.id, session.plan, Some(period_end), now)
        .await?;
    let quota = match applied {
        Some(quota) => quota,
        None => state.usage_meter.current(user.id, now).await?,
    };

    Ok(Json(subscription_view(&quota, now)))
}
