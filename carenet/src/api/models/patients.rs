//! API request/response models for patients.

use super::pagination::Pagination;
use crate::db::models::patients::PatientDBResponse;
use crate::types::{PatientId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PatientCreate {
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub care_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PatientUpdate {
    pub name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub care_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PatientResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PatientId,
    #[schema(value_type = String, format = "uuid")]
    pub guardian_id: UserId,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub care_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Query parameters for listing patients
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListPatientsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Search by patient name (case-insensitive substring match)
    pub search: Option<String>,
}

impl From<PatientDBResponse> for PatientResponse {
    fn from(db: PatientDBResponse) -> Self {
        Self {
            id: db.id,
            guardian_id: db.guardian_id,
            name: db.name,
            date_of_birth: db.date_of_birth,
            care_notes: db.care_notes,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
