use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::UserSummary;
use crate::rules::{GlucoseStatus, GlucoseUnit};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GlucoseReading {
    pub id: Uuid,
    pub user_id: Uuid,
    pub value: f64,
    pub unit: GlucoseUnit,
    pub status: GlucoseStatus,
    pub label: Option<String>,
    #[sqlx(rename = "measured_at")]
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A validated, classified reading ready to persist.
#[derive(Debug, Clone)]
pub struct NewReading {
    pub user_id: Uuid,
    pub value: f64,
    pub unit: GlucoseUnit,
    pub status: GlucoseStatus,
    pub label: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Raw submission; presence and format are checked by the handler so the
/// caller gets a validation error instead of a JSON rejection.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReadingRequest {
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub label: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminReadingQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<GlucoseStatus>,
    pub user_id: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Store-level predicate. `from` and `to` are inclusive, `before` is exclusive.
#[derive(Debug, Clone, Default)]
pub struct ReadingFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<GlucoseStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

impl ReadingFilter {
    pub fn for_user(user_id: Uuid) -> Self {
        Self { user_id: Some(user_id), ..Self::default() }
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn matches(&self, reading: &GlucoseReading) -> bool {
        self.user_id.map_or(true, |id| reading.user_id == id)
            && self.status.map_or(true, |s| reading.status == s)
            && self.from.map_or(true, |from| reading.timestamp >= from)
            && self.to.map_or(true, |to| reading.timestamp <= to)
            && self.before.map_or(true, |before| reading.timestamp < before)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            number: page.unwrap_or(1).max(1),
            size: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.number as i64 - 1) * self.size as i64
    }

    pub fn limit(&self) -> i64 {
        self.size as i64
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        (total + self.size as i64 - 1) / self.size as i64
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadingsPage {
    pub readings: Vec<GlucoseReading>,
    pub total_pages: i64,
    pub current_page: u32,
    pub total_readings: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadingWithOwner {
    #[serde(flatten)]
    pub reading: GlucoseReading,
    pub user: UserSummary,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminReadingsPage {
    pub readings: Vec<ReadingWithOwner>,
    pub total_pages: i64,
    pub current_page: u32,
    pub total_readings: i64,
}
