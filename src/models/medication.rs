use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPrescription {
    pub user_id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MedicationLog {
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub taken: bool,
    #[sqlx(rename = "logged_at")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrescriptionRequest {
    pub medication_name: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LogDoseRequest {
    pub taken: bool,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdherenceReport {
    pub adherence_percentage: Option<u32>,
    pub total_doses: usize,
    pub doses_taken: usize,
    pub adherence: crate::rules::Adherence,
}
