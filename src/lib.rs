//! GlucoTrack backend: glucose logging, derived health metrics, a metered
//! AI companion and route protection for the web client.

pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rules;
pub mod services;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::path::Path;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::handlers::{
    admin, appointments, auth as auth_handlers, billing, companion, dashboard, docs, health,
    medications, metrics, readings, user, AppState,
};
use crate::middleware::{access_gate, metrics_middleware};

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(auth_handlers::register))
        .route("/api/auth/login", post(auth_handlers::login))
        .route("/api/auth/logout", post(auth_handlers::logout))
        .route("/api/user/profile", get(user::get_profile).put(user::update_profile))
        .route("/api/user/password", axum::routing::put(user::change_password))
        .route("/api/readings", get(readings::list_readings).post(readings::create_reading))
        .route("/api/dashboard/stats", get(dashboard::stats))
        .route("/api/dashboard/previous-stats", get(dashboard::previous_stats))
        .route(
            "/api/appointments",
            get(appointments::list_appointments).post(appointments::create_appointment),
        )
        .route("/api/appointments/upcoming", get(appointments::upcoming_appointments))
        .route(
            "/api/medications",
            get(medications::list_prescriptions).post(medications::create_prescription),
        )
        .route("/api/medications/adherence", get(medications::adherence))
        .route("/api/medications/:id/logs", post(medications::log_dose))
        .route("/api/ai/health-companion", post(companion::ask))
        .route("/api/subscription", get(billing::subscription))
        .route("/api/checkout", post(billing::checkout))
        .route("/api/checkout/confirm", post(billing::confirm_checkout))
        .route("/api/admin/stats", get(admin::stats))
        .route("/api/admin/readings", get(admin::readings))
        .route("/api/admin/appointments", get(admin::appointments))
        .route("/health", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/metrics", get(metrics::metrics_handler))
}

fn cors_layer(app_url: &str) -> CorsLayer {
    match app_url.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true),
        Err(_) => CorsLayer::new(),
    }
}

/// Builds the full router: JSON API, docs, health and metrics, and the
/// gated single-page client served from `STATIC_DIR`.
pub fn create_app(state: AppState) -> Router {
    let static_dir = Path::new(&state.config.static_dir);
    let client = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));
    let gated_client = ServiceBuilder::new()
        .layer(from_fn_with_state(state.clone(), access_gate))
        .service(client);

    Router::new()
        .merge(api_routes())
        .merge(docs::create_docs_router())
        .route_layer(from_fn_with_state(state.clone(), metrics_middleware))
        .fallback_service(gated_client)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors_layer(&state.config.app_url)),
        )
        .with_state(state)
}
