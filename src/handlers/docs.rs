use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

use crate::handlers::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::liveness,
        crate::handlers::health::readiness,
        crate::handlers::metrics::metrics_handler,
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::logout,
        crate::handlers::user::get_profile,
        crate::handlers::user::update_profile,
        crate::handlers::user::change_password,
        crate::handlers::readings::create_reading,
        crate::handlers::readings::list_readings,
        crate::handlers::dashboard::stats,
        crate::handlers::dashboard::previous_stats,
        crate::handlers::appointments::list_appointments,
        crate::handlers::appointments::upcoming_appointments,
        crate::handlers::appointments::create_appointment,
        crate::handlers::medications::list_prescriptions,
        crate::handlers::medications::create_prescription,
        crate::handlers::medications::log_dose,
        crate::handlers::medications::adherence,
        crate::handlers::companion::ask,
        crate::handlers::billing::subscription,
        crate::handlers::billing::checkout,
        crate::handlers::billing::confirm_checkout,
        crate::handlers::admin::stats,
        crate::handlers::admin::readings,
        crate::handlers::admin::appointments,
    ),
    components(
        schemas(
            crate::models::CreateUserRequest,
            crate::models::LoginRequest,
            crate::models::AuthResponse,
            crate::models::UserProfile,
            crate::models::UserSummary,
            crate::models::UpdateProfileRequest,
            crate::models::ChangePasswordRequest,
            crate::models::Role,
            crate::models::CreateReadingRequest,
            crate::models::GlucoseReading,
            crate::models::ReadingsPage,
            crate::models::ReadingWithOwner,
            crate::models::AdminReadingsPage,
            crate::models::Appointment,
            crate::models::CreateAppointmentRequest,
            crate::models::AppointmentStatus,
            crate::models::AdminAppointment,
            crate::models::AdminAppointmentsPage,
            crate::models::Pagination,
            crate::models::Prescription,
            crate::models::CreatePrescriptionRequest,
            crate::models::MedicationLog,
            crate::models::LogDoseRequest,
            crate::models::AdherenceReport,
            crate::models::CheckoutRequest,
            crate::models::ConfirmCheckoutRequest,
            crate::models::SubscriptionResponse,
            crate::models::Plan,
            crate::models::BillingPeriod,
            crate::rules::GlucoseUnit,
            crate::rules::GlucoseStatus,
            crate::rules::RiskLevel,
            crate::rules::Adherence,
            crate::handlers::dashboard::DashboardStats,
            crate::handlers::dashboard::PreviousWeekStats,
            crate::handlers::companion::CompanionRequest,
            crate::handlers::companion::CompanionResponse,
            crate::handlers::admin::AdminStats,
        )
    ),
    tags(
        (name = "auth", description = "Registration and sign-in"),
        (name = "user", description = "Profile management"),
        (name = "readings", description = "Glucose readings"),
        (name = "dashboard", description = "Derived health metrics"),
        (name = "appointments", description = "Doctor appointments"),
        (name = "medications", description = "Prescriptions and dose adherence"),
        (name = "companion", description = "Metered AI health companion"),
        (name = "billing", description = "Plans and usage quota"),
        (name = "admin", description = "Administrative reporting"),
        (name = "health", description = "Health check endpoints")
    ),
    info(
        title = "GlucoTrack API",
        version = "1.0.0",
        description = "Diabetes management backend: glucose logging, risk metrics and a metered health companion"
    )
)]
pub struct ApiDoc;

pub fn create_docs_router() -> Router<AppState> {
    Router::new().route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_api_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/auth/logout",
            "/api/user/password",
            "/api/dashboard/previous-stats",
            "/api/appointments/upcoming",
            "/api/medications/{id}/logs",
            "/api/medications/adherence",
            "/api/checkout/confirm",
            "/api/admin/readings",
            "/api/admin/appointments",
            "/metrics",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{} missing", path);
        }

        let profile = &doc.paths.paths["/api/user/profile"];
        assert_eq!(profile.operations.len(), 2);
    }
}
