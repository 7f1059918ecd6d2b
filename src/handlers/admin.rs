use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    errors::Result,
    handlers::AppState,
    middleware::AdminUser,
    models::{
        AdminAppointment, AdminAppointmentQuery, AdminAppointmentsPage, AdminReadingQuery,
        AdminReadingsPage, AppointmentStatus, Page, Pagination, ReadingFilter,
    },
};

/// Users count as active with a reading inside this window.
const ACTIVE_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_users: i64,
    pub total_readings: i64,
    pub total_appointments: i64,
    pub active_users: i64,
}

#[utoipa::path(
    get,
    path = "/api/admin/stats",
    responses(
        (status = 200, description = "Aggregate counts", body = AdminStats),
        (status = 403, description = "Caller is not an administrator")
    ),
    tag = "admin"
)]
pub async fn stats(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<AdminStats>> {
    let db = &state.database;
    let since = Utc::now() - Duration::days(ACTIVE_WINDOW_DAYS);

    Ok(Json(AdminStats {
        total_users: db.users().count_users().await?,
        total_readings: db.readings().count_readings(&ReadingFilter::default()).await?,
        total_appointments: db.appointments().count_appointments(None).await?,
        active_users: db.readings().count_active_users(since).await?,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/readings",
    responses(
        (status = 200, description = "Filtered readings with owners", body = AdminReadingsPage),
        (status = 403, description = "Caller is not an administrator")
    ),
    tag = "admin"
)]
pub async fn readings(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<AdminReadingQuery>,
) -> Result<Json<AdminReadingsPage>> {
    let page = Page::new(query.page, query.limit);
    let filter = ReadingFilter {
        user_id: query.user_id,
        status: query.status,
        from: query.start_date,
        to: query.end_date,
        before: None,
    };

    let readings = state.database.readings().list_readings_with_owner(&filter, page).await?;
    let total = state.database.readings().count_readings(&filter).await?;

    Ok(Json(AdminReadingsPage {
        readings,
        total_pages: page.total_pages(total),
        current_page: page.number,
        total_readings: total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/appointments",
    responses(
        (status = 200, description = "Matching appointments with owners", body = AdminAppointmentsPage),
        (status = 403, description = "Caller is not an administrator")
    ),
    tag = "admin"
)]
pub async fn appointments(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<AdminAppointmentQuery>,
) -> Result<Json<AdminAppointmentsPage>> {
    let page = Page::new(query.page, query.limit);
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let rows = state.database.appointments().search_appointments(search, page).await?;
    let total = state.database.appointments().count_appointments(search).await?;

    let now = Utc::now();
    let appointments = rows
        .into_iter()
        .map(|(appointment, user)| AdminAppointment {
            status: AppointmentStatus::at(appointment.date, now),
            appointment,
            user,
        })
        .collect();

    Ok(Json(AdminAppointmentsPage {
        appointments,
        pagination: Pagination {
            total,
            pages: page.total_pages(total),
            page: page.number,
            limit: page.size,
        },
    }))
}
