use std::sync::Arc;

use crate::{
    auth::JwtService,
    config::Config,
    database::Database,
    errors::Result,
    middleware::GatePolicy,
    services::{
        CompanionModel, MetricsService, OpenAiClient, PaymentGateway, QuotaPolicy, StripeClient,
        UsageMeter,
    },
};

pub mod admin;
pub mod appointments;
pub mod auth;
pub mod billing;
pub mod companion;
pub mod dashboard;
pub mod docs;
pub mod health;
pub mod medications;
pub mod metrics;
pub mod readings;
pub mod user;

#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub config: Arc<Config>,
    pub jwt: Arc<JwtService>,
    pub gate: Arc<GatePolicy>,
    pub usage_meter: UsageMeter,
    pub companion: Arc<dyn CompanionModel>,
    pub payments: Arc<dyn PaymentGateway>,
    pub metrics: Arc<MetricsService>,
}

impl AppState {
    /// Wires the production collaborators described by `config`.
    pub fn new(database: Database, config: Config) -> Result<Self> {
        let companion = Arc::new(OpenAiClient::from_config(&config)?);
        let payments = Arc::new(StripeClient::from_config(&config)?);

        Ok(Self {
            jwt: Arc::new(JwtService::new(&config.jwt_secret, config.token_ttl_hours)),
            gate: Arc::new(GatePolicy::default()),
            usage_meter: UsageMeter::new(database.quotas(), QuotaPolicy::from_config(&config)),
            companion,
            payments,
            metrics: Arc::new(MetricsService::new()?),
            database,
            config: Arc::new(config),
        })
    }

    pub fn with_companion(mut self, companion: Arc<dyn CompanionModel>) -> Self {
        self.companion = companion;
        self
    }

    pub fn with_payments(mut self, payments: Arc<dyn PaymentGateway>) -> Self {
        self.payments = payments;
        self
    }
}
