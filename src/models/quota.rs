use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "plan_id", rename_all = "lowercase")]
pub enum Plan {
    Free,
    Basic,
    Premium,
}

impl Plan {
    pub fn cadence(self) -> ResetCadence {
        match self {
            Plan::Free => ResetCadence::Daily,
            Plan::Basic | Plan::Premium => ResetCadence::Monthly,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Basic => "basic",
            Plan::Premium => "premium",
        }
    }
}

impl std::str::FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Plan::Free),
            "basic" => Ok(Plan::Basic),
            "premium" => Ok(Plan::Premium),
            other => Err(format!("Unknown plan '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Monthly,
    Annual,
}

impl BillingPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Annual => "annual",
        }
    }

    pub fn months(self) -> u32 {
        match self {
            BillingPeriod::Monthly => 1,
            BillingPeriod::Annual => 12,
        }
    }
}

impl std::str::FromStr for BillingPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(BillingPeriod::Monthly),
            "annual" => Ok(BillingPeriod::Annual),
            other => Err(format!("Unknown billing period '{}'", other)),
        }
    }
}

/// Calendar boundary at which a quota is refilled. Boundaries are UTC
/// calendar dates, not rolling windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResetCadence {
    Daily,
    Monthly,
}

impl ResetCadence {
    /// True when `now` falls in a different calendar period than `last_reset`.
    pub fn is_due(self, last_reset: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let (last, now) = (last_reset.date_naive(), now.date_naive());
        match self {
            ResetCadence::Daily => last != now,
            ResetCadence::Monthly => (last.year(), last.month()) != (now.year(), now.month()),
        }
    }

    /// Start of the next calendar period after `now`.
    pub fn next_boundary(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive();
        let next = match self {
            ResetCadence::Daily => today.succ_opt(),
            ResetCadence::Monthly => NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
                .and_then(|first| first.checked_add_months(Months::new(1))),
        };
        next.unwrap_or(NaiveDate::MAX)
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc()
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageQuota {
    pub user_id: Uuid,
    pub plan: Plan,
    pub status: String,
    pub tokens_allotted: i32,
    pub tokens_remaining: i32,
    pub last_reset_at: DateTime<Utc>,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl UsageQuota {
    pub fn new(user_id: Uuid, plan: Plan, tokens: i32, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            plan,
            status: "active".to_string(),
            tokens_allotted: tokens,
            tokens_remaining: tokens,
            last_reset_at: now,
            current_period_end: None,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub plan_id: Option<String>,
    pub period: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmCheckoutRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub plan: Plan,
    pub status: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub tokens_remaining: i32,
    pub tokens_total: i32,
    pub resets_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_daily_uses_calendar_dates() {
        let last = at(2026, 3, 10, 23, 50);
        assert!(!ResetCadence::Daily.is_due(last, at(2026, 3, 10, 23, 59)));
        // ten minutes later but a new day
        assert!(ResetCadence::Daily.is_due(last, at(2026, 3, 11, 0, 0)));
        // 23 hours later on the same date
        let early = at(2026, 3, 10, 0, 30);
        assert!(!ResetCadence::Daily.is_due(early, at(2026, 3, 10, 23, 30)));
    }

    #[test]
    fn test_monthly_uses_calendar_months() {
        let last = at(2026, 1, 31, 12, 0);
        assert!(!ResetCadence::Monthly.is_due(last, at(2026, 1, 31, 23, 0)));
        assert!(ResetCadence::Monthly.is_due(last, at(2026, 2, 1, 0, 1)));
        assert!(ResetCadence::Monthly.is_due(at(2025, 12, 5, 0, 0), at(2026, 12, 5, 0, 0)));
    }

    #[test]
    fn test_next_boundary() {
        let now = at(2026, 12, 31, 15, 0);
        assert_eq!(ResetCadence::Daily.next_boundary(now), at(2027, 1, 1, 0, 0));
        assert_eq!(ResetCadence::Monthly.next_boundary(now), at(2027, 1, 1, 0, 0));
        assert_eq!(
            ResetCadence::Monthly.next_boundary(at(2026, 1, 31, 8, 0)),
            at(2026, 2, 1, 0, 0)
        );
    }

    #[test]
    fn test_plan_cadence() {
        assert_eq!(Plan::Free.cadence(), ResetCadence::Daily);
        assert_eq!(Plan::Premium.cadence(), ResetCadence::Monthly);
        assert_eq!("basic".parse::<Plan>().unwrap(), Plan::Basic);
        assert!("gold".parse::<Plan>().is_err());
    }
}
