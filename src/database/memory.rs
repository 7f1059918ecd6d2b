use axum::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AppointmentStore, MedicationStore, QuotaStore, ReadingStore, StoreHealth, UserStore};
use crate::errors::{AppError, Result};
use crate::models::*;

/// In-process store. All tables sit behind one lock, so every trait method
/// is atomic with respect to the others.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    readings: Vec<GlucoseReading>,
    appointments: Vec<Appointment>,
    prescriptions: Vec<Prescription>,
    logs: Vec<MedicationLog>,
    quotas: HashMap<Uuid, UsageQuota>,
    checkouts: HashMap<String, Uuid>,
}

impl Tables {
    fn apply_plan(
        &mut self,
        user_id: Uuid,
        plan: Plan,
        tokens: i32,
        period_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> UsageQuota {
        let mut quota = UsageQuota::new(user_id, plan, tokens, now);
        quota.current_period_end = period_end;
        self.quotas.insert(user_id, quota.clone());
        quota
    }

    fn summary(&self, user_id: Uuid) -> Option<UserSummary> {
        self.users.get(&user_id).map(|u| UserSummary {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            diabetes_type: u.diabetes_type.clone(),
        })
    }

    fn readings_newest_first(&self, filter: &ReadingFilter) -> Vec<GlucoseReading> {
        let mut matched: Vec<GlucoseReading> =
            self.readings.iter().filter(|r| filter.matches(r)).cloned().collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched
    }

    fn appointment_matches(&self, appointment: &Appointment, needle: Option<&str>) -> bool {
        let Some(needle) = needle else { return true };
        let contains = |haystack: &str| haystack.to_lowercase().contains(needle);
        contains(&appointment.title)
            || contains(&appointment.doctor_name)
            || self
                .users
                .get(&appointment.user_id)
                .map_or(false, |u| contains(&u.name) || contains(&u.email))
    }
}

fn page_slice<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect()
}

fn normalize_search(search: Option<&str>) -> Option<String> {
    search.map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase)
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.inner.lock().await;
        if tables.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(AppError::validation("User with this email already exists"));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            role: user.role,
            diabetes_type: user.diabetes_type,
            diagnosis_date: None,
            phone: None,
            address: None,
            city: None,
            medications: None,
            allergies: None,
            emergency_contact: None,
            emergency_phone: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.inner.lock().await;
        Ok(tables.users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn update_profile(&self, id: Uuid, update: &UpdateProfileRequest) -> Result<Option<User>> {
        let mut tables = self.inner.lock().await;
        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };

        fn merge(field: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                *field = value.clone();
            }
        }

        if let Some(name) = &update.name {
            user.name = name.clone();
        }
        merge(&mut user.phone, &update.phone);
        merge(&mut user.address, &update.address);
        merge(&mut user.city, &update.city);
        merge(&mut user.diabetes_type, &update.diabetes_type);
        if update.diagnosis_date.is_some() {
            user.diagnosis_date = update.diagnosis_date;
        }
        merge(&mut user.medications, &update.medications);
        merge(&mut user.allergies, &update.allergies);
        merge(&mut user.emergency_contact, &update.emergency_contact);
        merge(&mut user.emergency_phone, &update.emergency_phone);
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        let mut tables = self.inner.lock().await;
        match tables.users.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_users(&self) -> Result<i64> {
        Ok(self.inner.lock().await.users.len() as i64)
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn insert_reading(&self, reading: NewReading) -> Result<GlucoseReading> {
        let created = GlucoseReading {
            id: Uuid::new_v4(),
            user_id: reading.user_id,
            value: reading.value,
            unit: reading.unit,
            status: reading.status,
            label: reading.label,
            timestamp: reading.timestamp,
            created_at: Utc::now(),
        };
        self.inner.lock().await.readings.push(created.clone());
        Ok(created)
    }

    async fn list_readings(&self, filter: &ReadingFilter, page: Page) -> Result<Vec<GlucoseReading>> {
        let tables = self.inner.lock().await;
        Ok(page_slice(tables.readings_newest_first(filter), page))
    }

    async fn count_readings(&self, filter: &ReadingFilter) -> Result<i64> {
        let tables = self.inner.lock().await;
        Ok(tables.readings.iter().filter(|r| filter.matches(r)).count() as i64)
    }

    async fn all_readings(&self, filter: &ReadingFilter) -> Result<Vec<GlucoseReading>> {
        Ok(self.inner.lock().await.readings_newest_first(filter))
    }

    async fn list_readings_with_owner(
        &self,
        filter: &ReadingFilter,
        page: Page,
    ) -> Result<Vec<ReadingWithOwner>> {
        let tables = self.inner.lock().await;
        let readings = page_slice(tables.readings_newest_first(filter), page)
            .into_iter()
            .filter_map(|reading| {
                let user = tables.summary(reading.user_id)?;
                Some(ReadingWithOwner { reading, user })
            })
            .collect();
        Ok(readings)
    }

    async fn count_active_users(&self, since: DateTime<Utc>) -> Result<i64> {
        let tables = self.inner.lock().await;
        let mut active: Vec<Uuid> = tables
            .readings
            .iter()
            .filter(|r| r.timestamp >= since)
            .map(|r| r.user_id)
            .collect();
        active.sort();
        active.dedup();
        Ok(active.len() as i64)
    }
}

#[async_trait]
impl AppointmentStore for MemoryStore {
    async fn create_appointment(&self, appointment: NewAppointment) -> Result<Appointment> {
        let created = Appointment {
            id: Uuid::new_v4(),
            user_id: appointment.user_id,
            title: appointment.title,
            description: appointment.description,
            date: appointment.date,
            location: appointment.location,
            doctor_name: appointment.doctor_name,
            created_at: Utc::now(),
        };
        self.inner.lock().await.appointments.push(created.clone());
        Ok(created)
    }

    async fn list_appointments(&self, user_id: Uuid) -> Result<Vec<Appointment>> {
        let tables = self.inner.lock().await;
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        appointments.sort_by_key(|a| a.date);
        Ok(appointments)
    }

    async fn upcoming_appointments(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Appointment>> {
        let mut appointments = self.list_appointments(user_id).await?;
        appointments.retain(|a| a.date >= now);
        appointments.truncate(limit.max(0) as usize);
        Ok(appointments)
    }

    async fn search_appointments(
        &self,
        search: Option<&str>,
        page: Page,
    ) -> Result<Vec<(Appointment, UserSummary)>> {
        let needle = normalize_search(search);
        let tables = self.inner.lock().await;
        let mut matched: Vec<Appointment> = tables
            .appointments
            .iter()
            .filter(|a| tables.appointment_matches(a, needle.as_deref()))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.date.cmp(&a.date));

        Ok(page_slice(matched, page)
            .into_iter()
            .filter_map(|a| {
                let owner = tables.summary(a.user_id)?;
                Some((a, owner))
            })
            .collect())
    }

    async fn count_appointments(&self, search: Option<&str>) -> Result<i64> {
        let needle = normalize_search(search);
        let tables = self.inner.lock().await;
        Ok(tables
            .appointments
            .iter()
            .filter(|a| tables.appointment_matches(a, needle.as_deref()))
            .count() as i64)
    }
}

#[async_trait]
impl MedicationStore for MemoryStore {
    async fn create_prescription(&self, prescription: NewPrescription) -> Result<Prescription> {
        let created = Prescription {
            id: Uuid::new_v4(),
            user_id: prescription.user_id,
            medication_name: prescription.medication_name,
            dosage: prescription.dosage,
            frequency: prescription.frequency,
            is_active: true,
            created_at: Utc::now(),
        };
        self.inner.lock().await.prescriptions.push(created.clone());
        Ok(created)
    }

    async fn active_prescriptions(&self, user_id: Uuid) -> Result<Vec<Prescription>> {
        let tables = self.inner.lock().await;
        Ok(tables
            .prescriptions
            .iter()
            .filter(|p| p.user_id == user_id && p.is_active)
            .cloned()
            .collect())
    }

    async fn find_prescription(&self, id: Uuid) -> Result<Option<Prescription>> {
        let tables = self.inner.lock().await;
        Ok(tables.prescriptions.iter().find(|p| p.id == id).cloned())
    }

    async fn log_dose(
        &self,
        prescription_id: Uuid,
        taken: bool,
        timestamp: DateTime<Utc>,
    ) -> Result<MedicationLog> {
        let log = MedicationLog { id: Uuid::new_v4(), prescription_id, taken, timestamp };
        self.inner.lock().await.logs.push(log.clone());
        Ok(log)
    }

    async fn recent_logs(&self, prescription_id: Uuid, limit: i64) -> Result<Vec<MedicationLog>> {
        let tables = self.inner.lock().await;
        let mut logs: Vec<MedicationLog> = tables
            .logs
            .iter()
            .filter(|l| l.prescription_id == prescription_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        logs.truncate(limit.max(0) as usize);
        Ok(logs)
    }

    async fn logs_since(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<Vec<MedicationLog>> {
        let tables = self.inner.lock().await;
        let active: Vec<Uuid> = tables
            .prescriptions
            .iter()
            .filter(|p| p.user_id == user_id && p.is_active)
            .map(|p| p.id)
            .collect();
        let mut logs: Vec<MedicationLog> = tables
            .logs
            .iter()
            .filter(|l| active.contains(&l.prescription_id) && l.timestamp >= since)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(logs)
    }
}

#[async_trait]
impl QuotaStore for MemoryStore {
    async fn find_quota(&self, user_id: Uuid) -> Result<Option<UsageQuota>> {
        Ok(self.inner.lock().await.quotas.get(&user_id).cloned())
    }

    async fn insert_quota(&self, quota: &UsageQuota) -> Result<UsageQuota> {
        let mut tables = self.inner.lock().await;
        Ok(tables
            .quotas
            .entry(quota.user_id)
            .or_insert_with(|| quota.clone())
            .clone())
    }

    async fn reset_quota(
        &self,
        user_id: Uuid,
        observed_reset: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<UsageQuota>> {
        let mut tables = self.inner.lock().await;
        match tables.quotas.get_mut(&user_id) {
            Some(quota) if quota.last_reset_at == observed_reset => {
                quota.tokens_remaining = quota.tokens_allotted;
                quota.last_reset_at = now;
                Ok(Some(quota.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn consume_tokens(&self, user_id: Uuid, cost: i32) -> Result<Option<UsageQuota>> {
        let mut tables = self.inner.lock().await;
        match tables.quotas.get_mut(&user_id) {
            Some(quota) if cost > 0 && quota.tokens_remaining >= cost => {
                quota.tokens_remaining -= cost;
                Ok(Some(quota.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn apply_plan(
        &self,
        user_id: Uuid,
        plan: Plan,
        tokens: i32,
        period_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<UsageQuota> {
        let mut tables = self.inner.lock().await;
        Ok(tables.apply_plan(user_id, plan, tokens, period_end, now))
    }

    async fn apply_checkout(
        &self,
        session_id: &str,
        user_id: Uuid,
        plan: Plan,
        tokens: i32,
        period_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<UsageQuota>> {
        let mut tables = self.inner.lock().await;
        if tables.checkouts.contains_key(session_id) {
            return Ok(None);
        }
        tables.checkouts.insert(session_id.to_string(), user_id);
        Ok(Some(tables.apply_plan(user_id, plan, tokens, period_end, now)))
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{GlucoseStatus, GlucoseUnit};
    use chrono::Duration;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            name: "Jane Wanjiru".to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
            diabetes_type: Some("type1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected_case_insensitively() {
        let store = MemoryStore::default();
        store.create_user(new_user("jane@example.com")).await.unwrap();
        let err = store.create_user(new_user("JANE@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_reading_filter_and_order() {
        let store = MemoryStore::default();
        let user = store.create_user(new_user("a@example.com")).await.unwrap();
        let now = Utc::now();
        for days in 0..5 {
            store
                .insert_reading(NewReading {
                    user_id: user.id,
                    value: 5.0 + days as f64,
                    unit: GlucoseUnit::MmolL,
                    status: GlucoseStatus::Normal,
                    label: None,
                    timestamp: now - Duration::days(days),
                })
                .await
                .unwrap();
        }

        let filter = ReadingFilter::for_user(user.id).between(Some(now - Duration::days(2)), None);
        let readings = store.all_readings(&filter).await.unwrap();
        assert_eq!(readings.len(), 3);
        assert!(readings[0].timestamp > readings[1].timestamp);

        let page = store.list_readings(&ReadingFilter::for_user(user.id), Page::new(Some(2), Some(2))).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].value, 7.0);
    }

    #[tokio::test]
    async fn test_consume_never_overdraws() {
        let store = MemoryStore::default();
        let user_id = Uuid::new_v4();
        store.insert_quota(&UsageQuota::new(user_id, Plan::Free, 15, Utc::now())).await.unwrap();

        assert_eq!(store.consume_tokens(user_id, 10).await.unwrap().unwrap().tokens_remaining, 5);
        assert!(store.consume_tokens(user_id, 10).await.unwrap().is_none());
        assert!(store.consume_tokens(user_id, -20).await.unwrap().is_none());
        assert_eq!(store.find_quota(user_id).await.unwrap().unwrap().tokens_remaining, 5);
    }

    #[tokio::test]
    async fn test_checkout_session_applies_once() {
        let store = MemoryStore::default();
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let applied = store
            .apply_checkout("cs_1", user_id, Plan::Basic, 1000, None, now)
            .await
            .unwrap();
        assert_eq!(applied.unwrap().tokens_remaining, 1000);

        store.apply_plan(user_id, Plan::Free, 100, None, now).await.unwrap();
        let replay = store
            .apply_checkout("cs_1", user_id, Plan::Basic, 1000, None, now)
            .await
            .unwrap();
        assert!(replay.is_none());
        assert_eq!(store.find_quota(user_id).await.unwrap().unwrap().plan, Plan::Free);
    }

    #[tokio::test]
    async fn test_reset_is_compare_and_set() {
        let store = MemoryStore::default();
        let user_id = Uuid::new_v4();
        let start = Utc::now() - Duration::days(1);
        store.insert_quota(&UsageQuota::new(user_id, Plan::Free, 100, start)).await.unwrap();
        store.consume_tokens(user_id, 40).await.unwrap();

        let now = Utc::now();
        let first = store.reset_quota(user_id, start, now).await.unwrap();
        assert_eq!(first.unwrap().tokens_remaining, 100);
        // second observer of the stale timestamp loses
        assert!(store.reset_quota(user_id, start, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_appointments_matches_owner() {
        let store = MemoryStore::default();
        let user = store.create_user(new_user("wanjiru@example.com")).await.unwrap();
        store
            .create_appointment(NewAppointment {
                user_id: user.id,
                title: "Quarterly review".to_string(),
                description: None,
                date: Utc::now(),
                location: None,
                doctor_name: "Dr. Otieno".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(store.count_appointments(Some("otieno")).await.unwrap(), 1);
        assert_eq!(store.count_appointments(Some("WANJIRU")).await.unwrap(), 1);
        assert_eq!(store.count_appointments(Some("cardiology")).await.unwrap(), 0);
        assert_eq!(store.count_appointments(None).await.unwrap(), 1);
    }
}
