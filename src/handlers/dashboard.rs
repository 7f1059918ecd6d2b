use axum::{extract::State, response::Json};
use chrono::{Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    errors::Result,
    handlers::AppState,
    middleware::AuthenticatedUser,
    models::{GlucoseReading, ReadingFilter},
    rules::{average_mmol, estimate_hba1c, score, RiskLevel},
};

/// Readings per week the dashboard measures progress against.
pub const TARGET_WEEKLY_READINGS: u32 = 21;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// mmol/L, `null` without readings
    pub average_glucose: Option<f64>,
    pub hba1c: Option<f64>,
    pub readings_this_week: i64,
    pub risk_score: RiskLevel,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreviousWeekStats {
    pub average_glucose: Option<f64>,
    pub hba1c: Option<f64>,
    pub target_readings: u32,
}

fn glucose_summary(readings: &[GlucoseReading]) -> (Option<f64>, Option<f64>) {
    let average = average_mmol(readings.iter().map(|r| (r.value, r.unit)));
    (average, average.map(estimate_hba1c))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/stats",
    responses((status = 200, description = "Summary over all of the user's readings", body = DashboardStats)),
    tag = "dashboard"
)]
pub async fn stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<DashboardStats>> {
    let readings = state
        .database
        .readings()
        .all_readings(&ReadingFilter::for_user(user.id))
        .await?;
    let (average_glucose, hba1c) = glucose_summary(&readings);

    let week_ago = Utc::now() - Duration::days(7);
    let readings_this_week = readings.iter().filter(|r| r.timestamp >= week_ago).count() as i64;

    Ok(Json(DashboardStats {
        average_glucose,
        hba1c,
        readings_this_week,
        risk_score: score(readings.iter().map(|r| r.status)),
    }))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/previous-stats",
    responses((status = 200, description = "Averages over the week before last", body = PreviousWeekStats)),
    tag = "dashboard"
)]
pub async fn previous_stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<PreviousWeekStats>> {
    let now = Utc::now();
    let filter = ReadingFilter {
        from: Some(now - Duration::days(14)),
        before: Some(now - Duration::days(7)),
        ..ReadingFilter::for_user(user.id)
    };
    let readings = state.database.readings().all_readings(&filter).await?;
    let (average_glucose, hba1c) = glucose_summary(&readings);

    Ok(Json(PreviousWeekStats {
        average_glucose,
        hba1c,
        target_readings: TARGET_WEEKLY_READINGS,
    }))
}
