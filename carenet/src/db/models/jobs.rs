//! Database models for care jobs.

use crate::api::models::jobs::{JobStatus, JobUpdate};
use crate::types::{AgencyId, JobId, PatientId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

/// Database request for creating a job
#[derive(Debug, Clone)]
pub struct JobCreateDBRequest {
    pub guardian_id: UserId,
    pub patient_id: PatientId,
    pub agency_id: Option<AgencyId>,
    pub description: String,
    pub daily_rate: Decimal,
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

/// Database request for updating a job's details
#[derive(Debug, Clone, Default)]
pub struct JobUpdateDBRequest {
    pub description: Option<String>,
    pub daily_rate: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl From<JobUpdate> for JobUpdateDBRequest {
    fn from(api: JobUpdate) -> Self {
        Self {
            description: api.description,
            daily_rate: api.daily_rate,
            start_date: api.start_date,
            end_date: api.end_date,
        }
    }
}

/// Database response for a job
#[derive(Debug, Clone, FromRow)]
pub struct JobDBResponse {
    pub id: JobId,
    pub guardian_id: UserId,
    pub patient_id: PatientId,
    pub agency_id: Option<AgencyId>,
    pub caregiver_id: Option<UserId>,
    pub description: String,
    pub daily_rate: Decimal,
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
