use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    database::QuotaStore,
    errors::{AppError, Result},
    models::{Plan, UsageQuota},
};

/// Token allotment per plan.
#[derive(Debug, Clone, Copy)]
pub struct QuotaPolicy {
    pub free: i32,
    pub basic: i32,
    pub premium: i32,
}

impl QuotaPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            free: config.free_plan_tokens,
            basic: config.basic_plan_tokens,
            premium: config.premium_plan_tokens,
        }
    }

    pub fn allotment(&self, plan: Plan) -> i32 {
        match plan {
            Plan::Free => self.free,
            Plan::Basic => self.basic,
            Plan::Premium => self.premium,
        }
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self { free: 100, basic: 1000, premium: 3000 }
    }
}

/// Per-user consumable credit for companion requests.
///
/// Every mutation goes through a single conditional statement in the
/// store, so concurrent requests from one user can neither overdraw the
/// quota nor refill it twice for the same calendar boundary.
#[derive(Clone)]
pub struct UsageMeter {
    store: Arc<dyn QuotaStore>,
    policy: QuotaPolicy,
}

impl UsageMeter {
    pub fn new(store: Arc<dyn QuotaStore>, policy: QuotaPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    /// Fetches the user's quota, creating a free-tier one on first use.
    pub async fn ensure_quota(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<UsageQuota> {
        if let Some(quota) = self.store.find_quota(user_id).await? {
            return Ok(quota);
        }

        let fresh = UsageQuota::new(user_id, Plan::Free, self.policy.allotment(Plan::Free), now);
        let quota = self.store.insert_quota(&fresh).await?;
        info!("Created {} quota for user {}", quota.plan.as_str(), user_id);
        Ok(quota)
    }

    /// Refills the quota when `now` is past the plan's calendar boundary.
    pub async fn reset_if_due(&self, quota: UsageQuota, now: DateTime<Utc>) -> Result<UsageQuota> {
        if !quota.plan.cadence().is_due(quota.last_reset_at, now) {
            return Ok(quota);
        }

        match self
            .store
            .reset_quota(quota.user_id, quota.last_reset_at, now)
            .await?
        {
            Some(reset) => {
                info!(
                    "Reset quota for user {} to {} tokens",
                    reset.user_id, reset.tokens_remaining
                );
                Ok(reset)
            }
            // another request won the reset; read what it wrote
            None => self
                .store
                .find_quota(quota.user_id)
                .await?
                .ok_or(AppError::NotFound),
        }
    }

    /// Ensures the quota exists and is current for `now`.
    pub async fn current(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<UsageQuota> {
        let quota = self.ensure_quota(user_id, now).await?;
        self.reset_if_due(quota, now).await
    }

    /// Spends `cost` units. `cost` must be positive; a non-positive cost
    /// would credit the quota past its allotment.
    pub async fn try_consume(&self, quota: &UsageQuota, cost: i32) -> Result<UsageQuota> {
        if cost <= 0 {
            return Err(AppError::validation("Usage cost must be positive"));
        }
        match self.store.consume_tokens(quota.user_id, cost).await? {
            Some(updated) => Ok(updated),
            None => {
                let remaining = self
                    .store
                    .find_quota(quota.user_id)
                    .await?
                    .map_or(0, |q| q.tokens_remaining);
                warn!(
                    "Quota exhausted for user {}: {} remaining, {} required",
                    quota.user_id, remaining, cost
                );
                Err(AppError::QuotaExhausted { remaining, required: cost })
            }
        }
    }

    /// Switches the user to `plan`, refilling to its allotment.
    pub async fn apply_plan(
        &self,
        user_id: Uuid,
        plan: Plan,
        period_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<UsageQuota> {
        let quota = self
            .store
            .apply_plan(user_id, plan, self.policy.allotment(plan), period_end, now)
            .await?;
        info!("Applied {} plan for user {}", plan.as_str(), user_id);
        Ok(quota)
    }

    /// Applies a paid checkout session. `None` when that session was
    /// already applied.
    pub async fn apply_checkout(
        &self,
        session_id: &str,
        user_id: Uuid,
        plan: Plan,
        period_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<UsageQuota>> {
        let applied = self
            .store
            .apply_checkout(session_id, user_id, plan, self.policy.allotment(plan), period_end, now)
            .await?;
        match &applied {
            Some(_) => info!(
                "Applied {} plan for user {} from checkout {}",
                plan.as_str(),
                user_id,
                session_id
            ),
            None => warn!("Checkout {} for user {} was already applied", session_id, user_id),
        }
        Ok(applied)
    }
}
