use axum::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, FromRow, PgPool, Row};
use uuid::Uuid;

use super::{AppointmentStore, MedicationStore, QuotaStore, ReadingStore, StoreHealth, UserStore};
use crate::errors::{AppError, Result};
use crate::models::*;

const USER_COLUMNS: &str = "id, email, name, password_hash, role, diabetes_type, diagnosis_date, \
    phone, address, city, medications, allergies, emergency_contact, emergency_phone, \
    created_at, updated_at";

const READING_COLUMNS: &str = "id, user_id, value, unit, status, label, measured_at, created_at";

const APPOINTMENT_COLUMNS: &str =
    "id, user_id, title, description, date, location, doctor_name, created_at";

const QUOTA_COLUMNS: &str = "user_id, plan, status, tokens_allotted, tokens_remaining, \
    last_reset_at, current_period_end";

// $1..$5 bind user_id, status, from, to, before
const READING_FILTER: &str = "($1::uuid IS NULL OR r.user_id = $1) \
    AND ($2::glucose_status IS NULL OR r.status = $2) \
    AND ($3::timestamptz IS NULL OR r.measured_at >= $3) \
    AND ($4::timestamptz IS NULL OR r.measured_at <= $4) \
    AND ($5::timestamptz IS NULL OR r.measured_at < $5)";

// $1 binds an ILIKE pattern or NULL
const APPOINTMENT_SEARCH: &str = "($1::text IS NULL \
    OR a.title ILIKE $1 OR a.doctor_name ILIKE $1 \
    OR u.name ILIKE $1 OR u.email ILIKE $1)";

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn search_pattern(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let escaped = s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
            format!("%{}%", escaped)
        })
}

fn summary_from_row(row: &PgRow) -> std::result::Result<UserSummary, sqlx::Error> {
    Ok(UserSummary {
        id: row.try_get("owner_id")?,
        name: row.try_get("owner_name")?,
        email: row.try_get("owner_email")?,
        diabetes_type: row.try_get("owner_diabetes_type")?,
    })
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let sql = format!(
            "INSERT INTO users (email, name, password_hash, role, diabetes_type) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&sql)
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.password_hash)
            .bind(user.role)
            .bind(&user.diabetes_type)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    AppError::validation("User with this email already exists")
                }
                other => AppError::Database(other),
            })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE lower(email) = lower($1)", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn update_profile(&self, id: Uuid, update: &UpdateProfileRequest) -> Result<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                phone = COALESCE($3, phone),
                address = COALESCE($4, address),
                city = COALESCE($5, city),
                diabetes_type = COALESCE($6, diabetes_type),
                diagnosis_date = COALESCE($7, diagnosis_date),
                medications = COALESCE($8, medications),
                allergies = COALESCE($9, allergies),
                emergency_contact = COALESCE($10, emergency_contact),
                emergency_phone = COALESCE($11, emergency_phone),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(&update.name)
            .bind(&update.phone)
            .bind(&update.address)
            .bind(&update.city)
            .bind(&update.diabetes_type)
            .bind(update.diagnosis_date)
            .bind(&update.medications)
            .bind(&update.allergies)
            .bind(&update.emergency_contact)
            .bind(&update.emergency_phone)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_users(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl ReadingStore for PgStore {
    async fn insert_reading(&self, reading: NewReading) -> Result<GlucoseReading> {
        let sql = format!(
            "INSERT INTO glucose_readings (user_id, value, unit, status, label, measured_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            READING_COLUMNS
        );

        let created = sqlx::query_as::<_, GlucoseReading>(&sql)
            .bind(reading.user_id)
            .bind(reading.value)
            .bind(reading.unit)
            .bind(reading.status)
            .bind(&reading.label)
            .bind(reading.timestamp)
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }

    async fn list_readings(&self, filter: &ReadingFilter, page: Page) -> Result<Vec<GlucoseReading>> {
        let sql = format!(
            "SELECT {} FROM glucose_readings r WHERE {} \
             ORDER BY r.measured_at DESC LIMIT $6 OFFSET $7",
            READING_COLUMNS, READING_FILTER
        );

        let readings = sqlx::query_as::<_, GlucoseReading>(&sql)
            .bind(filter.user_id)
            .bind(filter.status)
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.before)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(readings)
    }

    async fn count_readings(&self, filter: &ReadingFilter) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM glucose_readings r WHERE {}", READING_FILTER);

        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(filter.user_id)
            .bind(filter.status)
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.before)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn all_readings(&self, filter: &ReadingFilter) -> Result<Vec<GlucoseReading>> {
        let sql = format!(
            "SELECT {} FROM glucose_readings r WHERE {} ORDER BY r.measured_at DESC",
            READING_COLUMNS, READING_FILTER
        );

        let readings = sqlx::query_as::<_, GlucoseReading>(&sql)
            .bind(filter.user_id)
            .bind(filter.status)
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.before)
            .fetch_all(&self.pool)
            .await?;

        Ok(readings)
    }

    async fn list_readings_with_owner(
        &self,
        filter: &ReadingFilter,
        page: Page,
    ) -> Result<Vec<ReadingWithOwner>> {
        let sql = format!(
            "SELECT r.id, r.user_id, r.value, r.unit, r.status, r.label, r.measured_at, r.created_at, \
                    u.id AS owner_id, u.name AS owner_name, u.email AS owner_email, \
                    u.diabetes_type AS owner_diabetes_type \
             FROM glucose_readings r JOIN users u ON u.id = r.user_id \
             WHERE {} ORDER BY r.measured_at DESC LIMIT $6 OFFSET $7",
            READING_FILTER
        );

        let rows = sqlx::query(&sql)
            .bind(filter.user_id)
            .bind(filter.status)
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.before)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let readings = rows
            .iter()
            .map(|row| {
                Ok(ReadingWithOwner {
                    reading: GlucoseReading::from_row(row)?,
                    user: summary_from_row(row)?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        Ok(readings)
    }

    async fn count_active_users(&self, since: DateTime<Utc>) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT user_id) FROM glucose_readings WHERE measured_at >= $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

#[async_trait]
impl AppointmentStore for PgStore {
    async fn create_appointment(&self, appointment: NewAppointment) -> Result<Appointment> {
        let sql = format!(
            "INSERT INTO appointments (user_id, title, description, date, location, doctor_name) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            APPOINTMENT_COLUMNS
        );

        let created = sqlx::query_as::<_, Appointment>(&sql)
            .bind(appointment.user_id)
            .bind(&appointment.title)
            .bind(&appointment.description)
            .bind(appointment.date)
            .bind(&appointment.location)
            .bind(&appointment.doctor_name)
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }

    async fn list_appointments(&self, user_id: Uuid) -> Result<Vec<Appointment>> {
        let sql = format!(
            "SELECT {} FROM appointments WHERE user_id = $1 ORDER BY date ASC",
            APPOINTMENT_COLUMNS
        );

        let appointments = sqlx::query_as::<_, Appointment>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(appointments)
    }

    async fn upcoming_appointments(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Appointment>> {
        let sql = format!(
            "SELECT {} FROM appointments WHERE user_id = $1 AND date >= $2 \
             ORDER BY date ASC LIMIT $3",
            APPOINTMENT_COLUMNS
        );

        let appointments = sqlx::query_as::<_, Appointment>(&sql)
            .bind(user_id)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(appointments)
    }

    async fn search_appointments(
        &self,
        search: Option<&str>,
        page: Page,
    ) -> Result<Vec<(Appointment, UserSummary)>> {
        let sql = format!(
            "SELECT a.id, a.user_id, a.title, a.description, a.date, a.location, a.doctor_name, \
                    a.created_at, u.id AS owner_id, u.name AS owner_name, u.email AS owner_email, \
                    u.diabetes_type AS owner_diabetes_type \
             FROM appointments a JOIN users u ON u.id = a.user_id \
             WHERE {} ORDER BY a.date DESC LIMIT $2 OFFSET $3",
            APPOINTMENT_SEARCH
        );

        let rows = sqlx::query(&sql)
            .bind(search_pattern(search))
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let appointments = rows
            .iter()
            .map(|row| Ok((Appointment::from_row(row)?, summary_from_row(row)?)))
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        Ok(appointments)
    }

    async fn count_appointments(&self, search: Option<&str>) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM appointments a JOIN users u ON u.id = a.user_id WHERE {}",
            APPOINTMENT_SEARCH
        );

        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(search_pattern(search))
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl MedicationStore for PgStore {
    async fn create_prescription(&self, prescription: NewPrescription) -> Result<Prescription> {
        let created = sqlx::query_as::<_, Prescription>(
            r#"
            INSERT INTO prescriptions (user_id, medication_name, dosage, frequency)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, medication_name, dosage, frequency, is_active, created_at
            "#,
        )
        .bind(prescription.user_id)
        .bind(&prescription.medication_name)
        .bind(&prescription.dosage)
        .bind(&prescription.frequency)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn active_prescriptions(&self, user_id: Uuid) -> Result<Vec<Prescription>> {
        let prescriptions = sqlx::query_as::<_, Prescription>(
            r#"
            SELECT id, user_id, medication_name, dosage, frequency, is_active, created_at
            FROM prescriptions
            WHERE user_id = $1 AND is_active
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(prescriptions)
    }

    async fn find_prescription(&self, id: Uuid) -> Result<Option<Prescription>> {
        let prescription = sqlx::query_as::<_, Prescription>(
            "SELECT id, user_id, medication_name, dosage, frequency, is_active, created_at \
             FROM prescriptions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(prescription)
    }

    async fn log_dose(
        &self,
        prescription_id: Uuid,
        taken: bool,
        timestamp: DateTime<Utc>,
    ) -> Result<MedicationLog> {
        let log = sqlx::query_as::<_, MedicationLog>(
            "INSERT INTO medication_logs (prescription_id, taken, logged_at) VALUES ($1, $2, $3) \
             RETURNING id, prescription_id, taken, logged_at",
        )
        .bind(prescription_id)
        .bind(taken)
        .bind(timestamp)
        .fetch_one(&self.pool)
        .await?;

        Ok(log)
    }

    async fn recent_logs(&self, prescription_id: Uuid, limit: i64) -> Result<Vec<MedicationLog>> {
        let logs = sqlx::query_as::<_, MedicationLog>(
            "SELECT id, prescription_id, taken, logged_at FROM medication_logs \
             WHERE prescription_id = $1 ORDER BY logged_at DESC LIMIT $2",
        )
        .bind(prescription_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    async fn logs_since(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<Vec<MedicationLog>> {
        let logs = sqlx::query_as::<_, MedicationLog>(
            r#"
            SELECT l.id, l.prescription_id, l.taken, l.logged_at
            FROM medication_logs l
            JOIN prescriptions p ON p.id = l.prescription_id
            WHERE p.user_id = $1 AND p.is_active AND l.logged_at >= $2
            ORDER BY l.logged_at DESC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }
}

#[async_trait]
impl QuotaStore for PgStore {
    async fn find_quota(&self, user_id: Uuid) -> Result<Option<UsageQuota>> {
        let sql = format!("SELECT {} FROM usage_quotas WHERE user_id = $1", QUOTA_COLUMNS);
        let quota = sqlx::query_as::<_, UsageQuota>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(quota)
    }

    async fn insert_quota(&self, quota: &UsageQuota) -> Result<UsageQuota> {
        sqlx::query(
            r#"
            INSERT INTO usage_quotas
                (user_id, plan, status, tokens_allotted, tokens_remaining, last_reset_at, current_period_end)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(quota.user_id)
        .bind(quota.plan)
        .bind(&quota.status)
        .bind(quota.tokens_allotted)
        .bind(quota.tokens_remaining)
        .bind(quota.last_reset_at)
        .bind(quota.current_period_end)
        .execute(&self.pool)
        .await?;

        // A concurrent first request may have won the insert; either way
        // the stored row is authoritative.
        self.find_quota(quota.user_id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("quota row missing after insert")))
    }

    async fn reset_quota(
        &self,
        user_id: Uuid,
        observed_reset: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<UsageQuota>> {
        let sql = format!(
            "UPDATE usage_quotas \
             SET tokens_remaining = tokens_allotted, last_reset_at = $3, updated_at = NOW() \
             WHERE user_id = $1 AND last_reset_at = $2 \
             RETURNING {}",
            QUOTA_COLUMNS
        );

        let quota = sqlx::query_as::<_, UsageQuota>(&sql)
            .bind(user_id)
            .bind(observed_reset)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        Ok(quota)
    }

    async fn consume_tokens(&self, user_id: Uuid, cost: i32) -> Result<Option<UsageQuota>> {
        let sql = format!(
            "UPDATE usage_quotas \
             SET tokens_remaining = tokens_remaining - $2, updated_at = NOW() \
             WHERE user_id = $1 AND $2 > 0 AND tokens_remaining >= $2 \
             RETURNING {}",
            QUOTA_COLUMNS
        );

        let quota = sqlx::query_as::<_, UsageQuota>(&sql)
            .bind(user_id)
            .bind(cost)
            .fetch_optional(&self.pool)
            .await?;

        Ok(quota)
    }

    async fn apply_plan(
        &self,
        user_id: Uuid,
        plan: Plan,
        tokens: i32,
        period_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<UsageQuota> {
        let sql = apply_plan_sql();
        let quota = sqlx::query_as::<_, UsageQuota>(&sql)
            .bind(user_id)
            .bind(plan)
            .bind(tokens)
            .bind(now)
            .bind(period_end)
            .fetch_one(&self.pool)
            .await?;

        Ok(quota)
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
        let mut tx = self.pool.begin().await?;

        let recorded = sqlx::query(
            "INSERT INTO processed_checkouts (session_id, user_id, plan, processed_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (session_id) DO NOTHING",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(plan)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if recorded.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let sql = apply_plan_sql();
        let quota = sqlx::query_as::<_, UsageQuota>(&sql)
            .bind(user_id)
            .bind(plan)
            .bind(tokens)
            .bind(now)
            .bind(period_end)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(quota))
    }
}

// $1..$5 bind user_id, plan, tokens, now, period_end
fn apply_plan_sql() -> String {
    format!(
        r#"
        INSERT INTO usage_quotas
            (user_id, plan, status, tokens_allotted, tokens_remaining, last_reset_at, current_period_end)
        VALUES ($1, $2, 'active', $3, $3, $4, $5)
        ON CONFLICT (user_id) DO UPDATE SET
            plan = EXCLUDED.plan,
            status = 'active',
            tokens_allotted = EXCLUDED.tokens_allotted,
            tokens_remaining = EXCLUDED.tokens_remaining,
            last_reset_at = EXCLUDED.last_reset_at,
            current_period_end = EXCLUDED.current_period_end,
            updated_at = NOW()
        RETURNING {}
        "#,
        QUOTA_COLUMNS
    )
}

#[async_trait]
impl StoreHealth for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_pattern_escapes_wildcards() {
        assert_eq!(search_pattern(None), None);
        assert_eq!(search_pattern(Some("   ")), None);
        assert_eq!(search_pattern(Some("Dr. Wan")).as_deref(), Some("%Dr. Wan%"));
        assert_eq!(search_pattern(Some("50%_off")).as_deref(), Some("%50\\%\\_off%"));
    }
}
