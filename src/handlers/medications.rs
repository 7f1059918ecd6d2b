use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
    middleware::AuthenticatedUser,
    models::{
        AdherenceReport, CreatePrescriptionRequest, LogDoseRequest, MedicationLog,
        NewPrescription, Prescription,
    },
    rules::{adherence_percentage, classify_adherence},
};

const ADHERENCE_WINDOW_DAYS: i64 = 7;

#[utoipa::path(
    get,
    path = "/api/medications",
    responses((status = 200, description = "Active prescriptions", body = [Prescription])),
    tag = "medications"
)]
pub async fn list_prescriptions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Prescription>>> {
    let prescriptions = state.database.medications().active_prescriptions(user.id).await?;
    Ok(Json(prescriptions))
}

#[utoipa::path(
    post,
    path = "/api/medications",
    request_body = CreatePrescriptionRequest,
    responses(
        (status = 201, description = "Prescription added", body = Prescription),
        (status = 400, description = "Missing medication name, dosage or frequency")
    ),
    tag = "medications"
)]
pub async fn create_prescription(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreatePrescriptionRequest>,
) -> Result<(StatusCode, Json<Prescription>)> {
    let field = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let (Some(medication_name), Some(dosage), Some(frequency)) = (
        field(request.medication_name),
        field(request.dosage),
        field(request.frequency),
    ) else {
        return Err(AppError::validation("Medication name, dosage and frequency are required"));
    };

    let prescription = state
        .database
        .medications()
        .create_prescription(NewPrescription { user_id: user.id, medication_name, dosage, frequency })
        .await?;

    Ok((StatusCode::CREATED, Json(prescription)))
}

#[utoipa::path(
    post,
    path = "/api/medications/{id}/logs",
    params(("id" = Uuid, Path, description = "Prescription id")),
    request_body = LogDoseRequest,
    responses(
        (status = 201, description = "Dose recorded", body = MedicationLog),
        (status = 404, description = "No such prescription for this user")
    ),
    tag = "medications"
)]
pub async fn log_dose(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(prescription_id): Path<Uuid>,
    Json(request): Json<LogDoseRequest>,
) -> Result<(StatusCode, Json<MedicationLog>)> {
    // someone else's prescription is reported as missing
    let prescription = state
        .database
        .medications()
        .find_prescription(prescription_id)
        .await?
        .filter(|p| p.user_id == user.id)
        .ok_or(AppError::NotFound)?;

    let log = state
        .database
        .medications()
        .log_dose(prescription.id, request.taken, request.timestamp.unwrap_or_else(Utc::now))
        .await?;

    Ok((StatusCode::CREATED, Json(log)))
}

#[utoipa::path(
    get,
    path = "/api/medications/adherence",
    responses((status = 200, description = "Adherence over the last seven days", body = AdherenceReport)),
    tag = "medications"
)]
pub async fn adherence(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<AdherenceReport>> {
    let since = Utc::now() - Duration::days(ADHERENCE_WINDOW_DAYS);
    let logs = state.database.medications().logs_since(user.id, since).await?;

    let total_doses = logs.len();
    let doses_taken = logs.iter().filter(|l| l.taken).count();

    Ok(Json(AdherenceReport {
        adherence_percentage: adherence_percentage(doses_taken, total_doses),
        total_doses,
        doses_taken,
        adherence: classify_adherence(doses_taken, total_doses),
    }))
}
