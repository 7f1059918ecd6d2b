//! Persistence boundary.
//!
//! Handlers and services only see the narrow store traits below. The
//! Postgres store is used in production; the in-memory store backs tests
//! and local demos. Both honour the same atomicity contract for quota
//! updates: a decrement either applies in full or not at all.

use axum::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::Result;
use crate::models::*;

pub mod memory;
pub mod queries;

pub use memory::MemoryStore;
pub use queries::PgStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn update_profile(&self, id: Uuid, update: &UpdateProfileRequest) -> Result<Option<User>>;
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<bool>;
    async fn count_users(&self) -> Result<i64>;
}

#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn insert_reading(&self, reading: NewReading) -> Result<GlucoseReading>;
    /// Newest first.
    async fn list_readings(&self, filter: &ReadingFilter, page: Page) -> Result<Vec<GlucoseReading>>;
    async fn count_readings(&self, filter: &ReadingFilter) -> Result<i64>;
    /// Every matching reading, newest first.
    async fn all_readings(&self, filter: &ReadingFilter) -> Result<Vec<GlucoseReading>>;
    async fn list_readings_with_owner(
        &self,
        filter: &ReadingFilter,
        page: Page,
    ) -> Result<Vec<ReadingWithOwner>>;
    /// Distinct users with at least one reading at or after `since`.
    async fn count_active_users(&self, since: DateTime<Utc>) -> Result<i64>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn create_appointment(&self, appointment: NewAppointment) -> Result<Appointment>;
    /// Oldest first.
    async fn list_appointments(&self, user_id: Uuid) -> Result<Vec<Appointment>>;
    async fn upcoming_appointments(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Appointment>>;
    /// Case-insensitive match on title, doctor, owner name or email; newest first.
    async fn search_appointments(
        &self,
        search: Option<&str>,
        page: Page,
    ) -> Result<Vec<(Appointment, UserSummary)>>;
    async fn count_appointments(&self, search: Option<&str>) -> Result<i64>;
}

#[async_trait]
pub trait MedicationStore: Send + Sync {
    async fn create_prescription(&self, prescription: NewPrescription) -> Result<Prescription>;
    async fn active_prescriptions(&self, user_id: Uuid) -> Result<Vec<Prescription>>;
    async fn find_prescription(&self, id: Uuid) -> Result<Option<Prescription>>;
    async fn log_dose(
        &self,
        prescription_id: Uuid,
        taken: bool,
        timestamp: DateTime<Utc>,
    ) -> Result<MedicationLog>;
    /// Newest first.
    async fn recent_logs(&self, prescription_id: Uuid, limit: i64) -> Result<Vec<MedicationLog>>;
    /// Logs of the user's active prescriptions at or after `since`.
    async fn logs_since(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<Vec<MedicationLog>>;
}

#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn find_quota(&self, user_id: Uuid) -> Result<Option<UsageQuota>>;
    /// Inserts `quota` unless the user already has one; returns the stored row.
    async fn insert_quota(&self, quota: &UsageQuota) -> Result<UsageQuota>;
    /// Refills the quota only if `last_reset_at` still equals `observed_reset`.
    /// `None` means another request reset it first.
    async fn reset_quota(
        &self,
        user_id: Uuid,
        observed_reset: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<UsageQuota>>;
    /// Decrements by a positive `cost` only if at least `cost` remains.
    /// `None` otherwise, in which case nothing changes.
    async fn consume_tokens(&self, user_id: Uuid, cost: i32) -> Result<Option<UsageQuota>>;
    /// Creates or replaces the plan, refilling to the new allotment.
    async fn apply_plan(
        &self,
        user_id: Uuid,
        plan: Plan,
        tokens: i32,
        period_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<UsageQuota>;
    /// Applies a paid checkout session at most once. Records `session_id`
    /// and applies the plan atomically; `None` when the session was
    /// already applied, in which case nothing changes.
    async fn apply_checkout(
        &self,
        session_id: &str,
        user_id: Uuid,
        plan: Plan,
        tokens: i32,
        period_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<UsageQuota>>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<()>;
}

/// Cheap-to-clone handle over the stores.
#[derive(Clone)]
pub struct Database {
    users: Arc<dyn UserStore>,
    readings: Arc<dyn ReadingStore>,
    appointments: Arc<dyn AppointmentStore>,
    medications: Arc<dyn MedicationStore>,
    quotas: Arc<dyn QuotaStore>,
    health: Arc<dyn StoreHealth>,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let store = PgStore::connect(database_url).await?;
        store.migrate().await?;
        Ok(Self::from_store(Arc::new(store)))
    }

    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::default()))
    }

    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserStore
            + ReadingStore
            + AppointmentStore
            + MedicationStore
            + QuotaStore
            + StoreHealth
            + 'static,
    {
        Self {
            users: store.clone(),
            readings: store.clone(),
            appointments: store.clone(),
            medications: store.clone(),
            quotas: store.clone(),
            health: store,
        }
    }

    pub fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    pub fn readings(&self) -> &dyn ReadingStore {
        self.readings.as_ref()
    }

    pub fn appointments(&self) -> &dyn AppointmentStore {
        self.appointments.as_ref()
    }

    pub fn medications(&self) -> &dyn MedicationStore {
        self.medications.as_ref()
    }

    pub fn quotas(&self) -> Arc<dyn QuotaStore> {
        self.quotas.clone()
    }

    pub async fn ping(&self) -> Result<()> {
        self.health.ping().await
    }
}
