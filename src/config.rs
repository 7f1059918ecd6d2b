use anyhow::{ensure, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub static_dir: String,
    pub app_url: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_max_tokens: u32,
    pub stripe_secret_key: String,
    pub stripe_base_url: String,
    pub prices: PriceTable,
    pub free_plan_tokens: i32,
    pub basic_plan_tokens: i32,
    pub premium_plan_tokens: i32,
    pub companion_request_cost: i32,
    pub upstream_timeout_secs: u64,
}

/// Stripe price identifiers per plan and billing period.
#[derive(Debug, Clone)]
pub struct PriceTable {
    pub basic_monthly: String,
    pub basic_annual: String,
    pub premium_monthly: String,
    pub premium_annual: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/glucotrack".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "your-secret-key-at-least-32-characters-long".to_string()),
            token_ttl_hours: env::var("TOKEN_TTL_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()?,
            static_dir: env::var("STATIC_DIR").unwrap_or_else(|_| "./web/dist".to_string()),
            app_url: env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            openai_max_tokens: env::var("OPENAI_MAX_TOKENS")
                .unwrap_or_else(|_| "400".to_string())
                .parse()?,
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            stripe_base_url: env::var("STRIPE_BASE_URL")
                .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string()),
            prices: PriceTable {
                basic_monthly: env::var("STRIPE_PRICE_BASIC_MONTHLY")
                    .unwrap_or_else(|_| "price_basic_monthly".to_string()),
                basic_annual: env::var("STRIPE_PRICE_BASIC_ANNUAL")
                    .unwrap_or_else(|_| "price_basic_annual".to_string()),
                premium_monthly: env::var("STRIPE_PRICE_PREMIUM_MONTHLY")
                    .unwrap_or_else(|_| "price_premium_monthly".to_string()),
                premium_annual: env::var("STRIPE_PRICE_PREMIUM_ANNUAL")
                    .unwrap_or_else(|_| "price_premium_annual".to_string()),
            },
            free_plan_tokens: env::var("FREE_PLAN_TOKENS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            basic_plan_tokens: env::var("BASIC_PLAN_TOKENS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            premium_plan_tokens: env::var("PREMIUM_PLAN_TOKENS")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            companion_request_cost: env::var("COMPANION_REQUEST_COST")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            upstream_timeout_secs: env::var("UPSTREAM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
        };
        config.validate()?;

        Ok(config)
    }

    /// Rejects settings that would break quota accounting.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.companion_request_cost > 0,
            "COMPANION_REQUEST_COST must be positive, got {}",
            self.companion_request_cost
        );
        for (name, tokens) in [
            ("FREE_PLAN_TOKENS", self.free_plan_tokens),
            ("BASIC_PLAN_TOKENS", self.basic_plan_tokens),
            ("PREMIUM_PLAN_TOKENS", self.premium_plan_tokens),
        ] {
            ensure!(tokens >= 0, "{} must not be negative, got {}", name, tokens);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            database_url: String::new(),
            port: 3000,
            jwt_secret: "secret".to_string(),
            token_ttl_hours: 24,
            static_dir: "./web/dist".to_string(),
            app_url: "http://localhost:3000".to_string(),
            openai_api_key: String::new(),
            openai_base_url: String::new(),
            openai_model: "gpt-4o".to_string(),
            openai_max_tokens: 400,
            stripe_secret_key: String::new(),
            stripe_base_url: String::new(),
            prices: PriceTable {
                basic_monthly: "bm".to_string(),
                basic_annual: "ba".to_string(),
                premium_monthly: "pm".to_string(),
                premium_annual: "pa".to_string(),
            },
            free_plan_tokens: 100,
            basic_plan_tokens: 1000,
            premium_plan_tokens: 3000,
            companion_request_cost: 10,
            upstream_timeout_secs: 30,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_non_positive_request_cost_is_rejected() {
        for cost in [0, -10] {
            let config = Config { companion_request_cost: cost, ..config() };
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("COMPANION_REQUEST_COST"));
        }
    }

    #[test]
    fn test_negative_allotment_is_rejected() {
        let config = Config { basic_plan_tokens: -1, ..config() };
        assert!(config.validate().is_err());
    }
}
