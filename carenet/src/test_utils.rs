//! Shared fixtures for tests.
//!
//! Fixture creators take a `PgConnection` so they compose with both pooled
//! connections and transactions. Usernames must be unique per test database;
//! emails are derived from them.

use crate::{
    AppState, Config,
    api::models::users::{CurrentUser, Role},
    auth::session::create_session_token,
    config::PaymentConfig,
    db::handlers::{Jobs, Patients, Payments, Repository, Users, payments::generate_invoice_number},
    db::models::{
        jobs::{JobCreateDBRequest, JobDBResponse},
        patients::{PatientCreateDBRequest, PatientDBResponse},
        payments::{PaymentCreateDBRequest, PaymentDBResponse},
        users::{UserCreateDBRequest, UserDBResponse},
    },
    payment_providers,
    types::{JobId, PatientId, UserId},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

/// A config suitable for tests: dummy payment gateway, fixed secret key.
pub fn create_test_config() -> Config {
    Config {
        secret_key: Some("test-secret-key".to_string()),
        payment: PaymentConfig::Dummy,
        ..Config::default()
    }
}

/// Build an [`AppState`] over a test pool.
pub fn test_state(pool: PgPool, config: Config) -> AppState {
    let payments = payment_providers::from_config(&config.payment).expect("dummy provider cannot fail");
    AppState::builder().db(pool).config(config).payments(payments).build()
}

/// Mint a session token for a fixture user.
pub fn token_for(user: &UserDBResponse, config: &Config) -> String {
    create_session_token(&CurrentUser::from(user.clone()), config).expect("token creation failed")
}

async fn create_user(conn: &mut PgConnection, username: &str, roles: Vec<Role>) -> UserDBResponse {
    Users::new(conn)
        .create(&UserCreateDBRequest {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            phone: None,
            display_name: None,
            is_admin: false,
            roles,
            auth_source: "test".to_string(),
            password_hash: None,
        })
        .await
        .expect("failed to create fixture user")
}

pub async fn create_guardian(conn: &mut PgConnection, username: &str) -> UserDBResponse {
    create_user(conn, username, vec![Role::Guardian]).await
}

pub async fn create_caregiver(conn: &mut PgConnection, username: &str) -> UserDBResponse {
    create_user(conn, username, vec![Role::Caregiver]).await
}

pub async fn create_moderator(conn: &mut PgConnection, username: &str) -> UserDBResponse {
    create_user(conn, username, vec![Role::Moderator]).await
}

pub async fn create_agency_owner(conn: &mut PgConnection, username: &str) -> UserDBResponse {
    create_user(conn, username, vec![Role::Agency]).await
}

pub async fn create_patient(conn: &mut PgConnection, guardian_id: UserId) -> PatientDBResponse {
    Patients::new(conn)
        .create(&PatientCreateDBRequest {
            guardian_id,
            name: "Test Patient".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1950, 1, 15),
            care_notes: None,
        })
        .await
        .expect("failed to create fixture patient")
}

pub async fn create_job(conn: &mut PgConnection, guardian_id: UserId, patient_id: PatientId) -> JobDBResponse {
    Jobs::new(conn)
        .create(&JobCreateDBRequest {
            guardian_id,
            patient_id,
            agency_id: None,
            description: "Daytime elderly care".to_string(),
            daily_rate: Decimal::new(150000, 2),
            currency: "BDT".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            end_date: None,
        })
        .await
        .expect("failed to create fixture job")
}

pub async fn create_payment(conn: &mut PgConnection, job_id: JobId, payer_id: UserId) -> PaymentDBResponse {
    Payments::new(conn)
        .create(&PaymentCreateDBRequest {
            job_id,
            payer_id,
            amount: Decimal::new(1050000, 2),
            currency: "BDT".to_string(),
            method: crate::api::models::payments::PaymentMethod::Bkash,
            transaction_id: None,
            invoice_number: generate_invoice_number(),
        })
        .await
        .expect("failed to create fixture payment")
}

/// Patient, job and a confirmed (COMPLETED) payment for the given guardian.
pub async fn create_completed_payment(
    conn: &mut PgConnection,
    guardian: &UserDBResponse,
) -> (PaymentDBResponse, JobDBResponse) {
    let patient = create_patient(conn, guardian.id).await;
    let job = create_job(conn, guardian.id, patient.id).await;
    let payment = create_payment(conn, job.id, guardian.id).await;
    let payment = Payments::new(conn)
        .confirm(payment.id, &format!("TEST-TXN-{}", uuid::Uuid::new_v4()))
        .await
        .expect("failed to confirm fixture payment");
    (payment, job)
}
