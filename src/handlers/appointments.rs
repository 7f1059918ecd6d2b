use axum::{extract::State, http::StatusCode, response::Json};
use chrono::Utc;

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
    middleware::AuthenticatedUser,
    models::{Appointment, CreateAppointmentRequest, NewAppointment},
};

const UPCOMING_LIMIT: i64 = 3;

/// Trimmed value; blank counts as absent.
fn trimmed(field: Option<String>) -> Option<String> {
    field.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[utoipa::path(
    get,
    path = "/api/appointments",
    responses((status = 200, description = "All appointments, oldest first", body = [Appointment])),
    tag = "appointments"
)]
pub async fn list_appointments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Appointment>>> {
    let appointments = state.database.appointments().list_appointments(user.id).await?;
    Ok(Json(appointments))
}

#[utoipa::path(
    get,
    path = "/api/appointments/upcoming",
    responses((status = 200, description = "Next three future appointments", body = [Appointment])),
    tag = "appointments"
)]
pub async fn upcoming_appointments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Appointment>>> {
    let appointments = state
        .database
        .appointments()
        .upcoming_appointments(user.id, Utc::now(), UPCOMING_LIMIT)
        .await?;
    Ok(Json(appointments))
}

#[utoipa::path(
    post,
    path = "/api/appointments",
    request_body = CreateAppointmentRequest,
    responses(
        (status = 201, description = "Appointment booked", body = Appointment),
        (status = 400, description = "Missing title, date or doctor")
    ),
    tag = "appointments"
)]
pub async fn create_appointment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>)> {
    let (Some(title), Some(date), Some(doctor_name)) = (
        trimmed(request.title),
        request.date,
        trimmed(request.doctor_name),
    ) else {
        return Err(AppError::validation("Missing required fields"));
    };

    let appointment = state
        .database
        .appointments()
        .create_appointment(NewAppointment {
            user_id: user.id,
            title,
            description: trimmed(request.description),
            date,
            location: trimmed(request.location),
            doctor_name,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(appointment)))
}
