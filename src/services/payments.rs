use axum::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::{
    config::{Config, PriceTable},
    errors::{AppError, Result},
    models::{BillingPeriod, Plan},
};

/// A checkout session as reported back by the payment provider.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    pub id: String,
    pub paid: bool,
    pub user_id: Uuid,
    pub plan: Plan,
    pub period: BillingPeriod,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Starts a hosted checkout and returns the URL to send the user to.
    async fn create_checkout(&self, user_id: Uuid, plan: Plan, period: BillingPeriod) -> Result<String>;
    async fn fetch_session(&self, session_id: &str) -> Result<CheckoutSession>;
}

#[derive(Debug, Deserialize)]
struct SessionCreated {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionDetails {
    id: String,
    payment_status: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

pub struct StripeClient {
    client: Client,
    base_url: String,
    secret_key: String,
    app_url: String,
    prices: PriceTable,
}

impl StripeClient {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        app_url: impl Into<String>,
        prices: PriceTable,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            app_url: app_url.into().trim_end_matches('/').to_string(),
            prices,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.stripe_base_url,
            &config.stripe_secret_key,
            &config.app_url,
            config.prices.clone(),
            Duration::from_secs(config.upstream_timeout_secs),
        )
    }

    fn price_for(&self, plan: Plan, period: BillingPeriod) -> Result<&str> {
        let price = match (plan, period) {
            (Plan::Basic, BillingPeriod::Monthly) => &self.prices.basic_monthly,
            (Plan::Basic, BillingPeriod::Annual) => &self.prices.basic_annual,
            (Plan::Premium, BillingPeriod::Monthly) => &self.prices.premium_monthly,
            (Plan::Premium, BillingPeriod::Annual) => &self.prices.premium_annual,
            (Plan::Free, _) => return Err(AppError::validation("The free plan has no checkout")),
        };
        Ok(price)
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_checkout(&self, user_id: Uuid, plan: Plan, period: BillingPeriod) -> Result<String> {
        let price = self.price_for(plan, period)?;
        let user = user_id.to_string();
        let success_url = format!(
            "{}/billing?success=true&session_id={{CHECKOUT_SESSION_ID}}",
            self.app_url
        );
        let cancel_url = format!("{}/billing?canceled=true", self.app_url);

        let form = [
            ("mode", "subscription"),
            ("line_items[0][price]", price),
            ("line_items[0][quantity]", "1"),
            ("client_reference_id", user.as_str()),
            ("metadata[user_id]", user.as_str()),
            ("metadata[plan]", plan.as_str()),
            ("metadata[period]", period.as_str()),
            ("success_url", success_url.as_str()),
            ("cancel_url", cancel_url.as_str()),
        ];

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&form[..])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Checkout request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Checkout creation returned {}",
                response.status()
            )));
        }

        let session: SessionCreated = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse checkout session: {}", e)))?;

        session
            .url
            .ok_or_else(|| AppError::Upstream("Checkout session has no URL".to_string()))
    }

    async fn fetch_session(&self, session_id: &str) -> Result<CheckoutSession> {
        let response = self
            .client
            .get(format!("{}/checkout/sessions/{}", self.base_url, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Session lookup failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound);
        }
        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Session lookup returned {}",
                response.status()
            )));
        }

        let details: SessionDetails = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse checkout session: {}", e)))?;

        let field = |key: &str| {
            details
                .metadata
                .get(key)
                .ok_or_else(|| AppError::Upstream(format!("Checkout session is missing {}", key)))
        };
        let user_id = Uuid::parse_str(field("user_id")?)
            .map_err(|_| AppError::Upstream("Checkout session has a malformed user".to_string()))?;
        let plan = field("plan")?.parse::<Plan>().map_err(AppError::Upstream)?;
        let period = field("period")?.parse::<BillingPeriod>().map_err(AppError::Upstream)?;

        Ok(CheckoutSession {
            id: details.id,
            paid: details.payment_status == "paid",
            user_id,
            plan,
            period,
        })
    }
}
