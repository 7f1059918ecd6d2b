use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
    middleware::AuthenticatedUser,
    models::{CreateReadingRequest, NewReading, Page, ReadingFilter, ReadingQuery, ReadingsPage},
    rules::{classify, GlucoseUnit},
};

/// Checks presence and format of a submission before classification.
fn validate(user: &AuthenticatedUser, request: CreateReadingRequest) -> Result<NewReading> {
    let (value, unit) = match (request.value, request.unit.as_deref()) {
        (Some(value), Some(unit)) => (value, unit),
        _ => return Err(AppError::validation("Value and unit are required")),
    };
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::validation("Value must be a non-negative number"));
    }
    let unit: GlucoseUnit = unit.parse().map_err(AppError::Validation)?;

    Ok(NewReading {
        user_id: user.id,
        value,
        unit,
        status: classify(value, unit),
        label: request.label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
        timestamp: request.timestamp.unwrap_or_else(Utc::now),
    })
}

#[utoipa::path(
    post,
    path = "/api/readings",
    request_body = CreateReadingRequest,
    responses(
        (status = 201, description = "Reading classified and stored", body = crate::models::GlucoseReading),
        (status = 400, description = "Missing or malformed value or unit"),
        (status = 401, description = "Not signed in")
    ),
    tag = "readings"
)]
pub async fn create_reading(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateReadingRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let reading = validate(&user, request)?;
    let reading = state.database.readings().insert_reading(reading).await?;

    state.metrics.record_reading(reading.status);
    info!(
        "Recorded {} {} reading for user {} as {}",
        reading.value, reading.unit, user.id, reading.status
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Reading recorded successfully",
            "data": reading
        })),
    ))
}

#[utoipa::path(
    get,
    path = "/api/readings",
    params(
        ("page" = Option<u32>, Query, description = "1-based page number"),
        ("limit" = Option<u32>, Query, description = "Page size, at most 100"),
        ("startDate" = Option<String>, Query, description = "Inclusive lower bound (RFC 3339)"),
        ("endDate" = Option<String>, Query, description = "Inclusive upper bound (RFC 3339)")
    ),
    responses((status = 200, description = "Newest readings first", body = ReadingsPage)),
    tag = "readings"
)]
pub async fn list_readings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ReadingQuery>,
) -> Result<Json<ReadingsPage>> {
    let page = Page::new(query.page, query.limit);
    let filter = ReadingFilter::for_user(user.id).between(query.start_date, query.end_date);

    let readings = state.database.readings().list_readings(&filter, page).await?;
    let total = state.database.readings().count_readings(&filter).await?;

    Ok(Json(ReadingsPage {
        readings,
        total_pages: page.total_pages(total),
        current_page: page.number,
        total_readings: total,
    }))
}
