//! Runs against a real Postgres when `TEST_DATABASE_URL` is set, otherwise
//! every test returns early. Rows are keyed by fresh ids so tests can share
//! one database concurrently.

use chrono::{Duration, TimeZone, Utc};
use glucotrack_server::{
    database::{
        AppointmentStore, MedicationStore, PgStore, QuotaStore, ReadingStore, UserStore,
    },
    errors::AppError,
    models::{
        NewAppointment, NewPrescription, NewReading, NewUser, Page, Plan, ReadingFilter, Role,
        UpdateProfileRequest, UsageQuota, User,
    },
    rules::{classify, GlucoseStatus, GlucoseUnit},
};
use std::env;
use uuid::Uuid;

async fn setup_store() -> Option<PgStore> {
    let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return None;
    };

    let store = PgStore::connect(&database_url)
        .await
        .expect("Failed to connect to test database");
    store.migrate().await.expect("Failed to run migrations");
    Some(store)
}

async fn create_user(store: &PgStore) -> User {
    store
        .create_user(NewUser {
            email: format!("{}@example.com", Uuid::new_v4()),
            name: "Test Patient".to_string(),
            password_hash: "hashed_password".to_string(),
            role: Role::User,
            diabetes_type: Some("type2".to_string()),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_create_and_get_user() {
    let Some(store) = setup_store().await else { return };

    let user = create_user(&store).await;
    assert_eq!(user.role, Role::User);

    let by_email = store
        .find_user_by_email(&user.email.to_uppercase())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_email.id, user.id);

    let by_id = store.find_user_by_id(user.id).await.unwrap().unwrap();
    assert_eq!(by_id.email, user.email);

    assert!(store.find_user_by_id(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_email_is_validation_error() {
    let Some(store) = setup_store().await else { return };

    let user = create_user(&store).await;
    let result = store
        .create_user(NewUser {
            email: user.email.clone(),
            name: "Copy".to_string(),
            password_hash: "x".to_string(),
            role: Role::User,
            diabetes_type: None,
        })
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_update_profile_keeps_unset_fields() {
    let Some(store) = setup_store().await else { return };

    let user = create_user(&store).await;
    let update = UpdateProfileRequest {
        city: Some("Kisumu".to_string()),
        ..UpdateProfileRequest::default()
    };

    let updated = store.update_profile(user.id, &update).await.unwrap().unwrap();
    assert_eq!(updated.city.as_deref(), Some("Kisumu"));
    assert_eq!(updated.name, "Test Patient");
    assert_eq!(updated.diabetes_type.as_deref(), Some("type2"));

    assert!(store.update_password(user.id, "new_hash").await.unwrap());
    assert!(!store.update_password(Uuid::new_v4(), "new_hash").await.unwrap());
}

#[tokio::test]
async fn test_readings_filter_and_paginate() {
    let Some(store) = setup_store().await else { return };

    let user = create_user(&store).await;
    let base = Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap();
    for (i, value) in [5.0, 8.5, 12.0, 3.2, 6.1].into_iter().enumerate() {
        store
            .insert_reading(NewReading {
                user_id: user.id,
                value,
                unit: GlucoseUnit::MmolL,
                status: classify(value, GlucoseUnit::MmolL),
                label: None,
                timestamp: base + Duration::days(i as i64),
            })
            .await
            .unwrap();
    }

    let filter = ReadingFilter::for_user(user.id);
    assert_eq!(store.count_readings(&filter).await.unwrap(), 5);

    let first_page = store.list_readings(&filter, Page::new(Some(1), Some(2))).await.unwrap();
    assert_eq!(first_page.len(), 2);
    assert_eq!(first_page[0].value, 6.1);
    assert_eq!(first_page[0].timestamp, base + Duration::days(4));

    let high = ReadingFilter { status: Some(GlucoseStatus::High), ..filter.clone() };
    assert_eq!(store.count_readings(&high).await.unwrap(), 1);

    let window = filter
        .clone()
        .between(Some(base + Duration::days(1)), Some(base + Duration::days(2)));
    assert_eq!(store.all_readings(&window).await.unwrap().len(), 2);

    let with_owner = store
        .list_readings_with_owner(&high, Page::new(None, None))
        .await
        .unwrap();
    assert_eq!(with_owner[0].user.id, user.id);
}

#[tokio::test]
async fn test_appointments_search_by_owner() {
    let Some(store) = setup_store().await else { return };

    let user = create_user(&store).await;
    let marker = Uuid::new_v4().simple().to_string();
    let now = Utc::now();
    for (title, offset) in [("Retina screening", -3), ("Quarterly review", 10)] {
        store
            .create_appointment(NewAppointment {
                user_id: user.id,
                title: title.to_string(),
                description: None,
                date: now + Duration::days(offset),
                location: None,
                doctor_name: format!("Dr. {}", marker),
            })
            .await
            .unwrap();
    }

    let upcoming = store.upcoming_appointments(user.id, now, 3).await.unwrap();
    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0].title, "Quarterly review");

    let found = store
        .search_appointments(Some(&marker.to_uppercase()), Page::new(None, None))
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].0.title, "Quarterly review");
    assert_eq!(found[0].1.email, user.email);
    assert_eq!(store.count_appointments(Some(&marker)).await.unwrap(), 2);
}

#[tokio::test]
async fn test_medication_logs() {
    let Some(store) = setup_store().await else { return };

    let user = create_user(&store).await;
    let prescription = store
        .create_prescription(NewPrescription {
            user_id: user.id,
            medication_name: "Metformin".to_string(),
            dosage: "500mg".to_string(),
            frequency: "twice daily".to_string(),
        })
        .await
        .unwrap();
    assert!(prescription.is_active);

    let now = Utc::now();
    store.log_dose(prescription.id, true, now - Duration::days(10)).await.unwrap();
    store.log_dose(prescription.id, false, now - Duration::days(2)).await.unwrap();
    store.log_dose(prescription.id, true, now - Duration::hours(1)).await.unwrap();

    let recent = store.recent_logs(prescription.id, 5).await.unwrap();
    assert_eq!(recent.len(), 3);
    assert!(recent[0].taken);

    let week = store.logs_since(user.id, now - Duration::days(7)).await.unwrap();
    assert_eq!(week.len(), 2);
}

#[tokio::test]
async fn test_quota_consume_and_reset() {
    let Some(store) = setup_store().await else { return };

    let user = create_user(&store).await;
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let quota = store
        .insert_quota(&UsageQuota::new(user.id, Plan::Free, 100, start))
        .await
        .unwrap();

    // second insert keeps the existing row
    let again = store
        .insert_quota(&UsageQuota::new(user.id, Plan::Premium, 3000, start))
        .await
        .unwrap();
    assert_eq!(again.plan, Plan::Free);

    for _ in 0..5 {
        store.consume_tokens(user.id, 10).await.unwrap().unwrap();
    }
    assert!(store.consume_tokens(user.id, 60).await.unwrap().is_none());
    assert_eq!(store.find_quota(user.id).await.unwrap().unwrap().tokens_remaining, 50);

    let next_day = start + Duration::days(1);
    let reset = store
        .reset_quota(user.id, quota.last_reset_at, next_day)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reset.tokens_remaining, 100);
    assert!(store
        .reset_quota(user.id, quota.last_reset_at, next_day)
        .await
        .unwrap()
        .is_none());

    let period_end = next_day + Duration::days(30);
    let upgraded = store
        .apply_plan(user.id, Plan::Basic, 1000, Some(period_end), next_day)
        .await
        .unwrap();
    assert_eq!(upgraded.tokens_remaining, 1000);
    assert_eq!(upgraded.current_period_end, Some(period_end));
}

#[tokio::test]
async fn test_checkout_session_applied_once() {
    let Some(store) = setup_store().await else { return };

    let user = create_user(&store).await;
    let session_id = format!("cs_{}", Uuid::new_v4().simple());
    let now = Utc::now();
    let period_end = now + Duration::days(30);

    let applied = store
        .apply_checkout(&session_id, user.id, Plan::Basic, 1000, Some(period_end), now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(applied.plan, Plan::Basic);

    store.apply_plan(user.id, Plan::Free, 100, None, now).await.unwrap();
    let replay = store
        .apply_checkout(&session_id, user.id, Plan::Basic, 1000, Some(period_end), now)
        .await
        .unwrap();
    assert!(replay.is_none());
    assert_eq!(store.find_quota(user.id).await.unwrap().unwrap().plan, Plan::Free);
}
