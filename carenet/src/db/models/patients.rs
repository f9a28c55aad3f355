//! Database models for patients.

use crate::api::models::patients::{PatientCreate, PatientUpdate};
use crate::types::{PatientId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

/// Database request for creating a patient
#[derive(Debug, Clone)]
pub struct PatientCreateDBRequest {
    pub guardian_id: UserId,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub care_notes: Option<String>,
}

impl PatientCreateDBRequest {
    pub fn new(api: PatientCreate, guardian_id: UserId) -> Self {
        Self {
            guardian_id,
            name: api.name,
            date_of_birth: api.date_of_birth,
            care_notes: api.care_notes,
        }
    }
}

/// Database request for updating a patient
#[derive(Debug, Clone, Default)]
pub struct PatientUpdateDBRequest {
    pub name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub care_notes: Option<String>,
}

impl From<PatientUpdate> for PatientUpdateDBRequest {
    fn from(api: PatientUpdate) -> Self {
        Self {
            name: api.name,
            date_of_birth: api.date_of_birth,
            care_notes: api.care_notes,
        }
    }
}

/// Database response for a patient
#[derive(Debug, Clone, FromRow)]
pub struct PatientDBResponse {
    pub id: PatientId,
    pub guardian_id: UserId,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub care_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
