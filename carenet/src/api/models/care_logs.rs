//! API request/response models for care logs.

use super::pagination::Pagination;
use crate::db::models::care_logs::CareLogDBResponse;
use crate::types::{CareLogId, JobId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CareLogCreate {
    #[schema(value_type = String, format = "uuid")]
    pub job_id: JobId,
    /// What was done (e.g. "medication", "physiotherapy", "meal")
    pub activity: String,
    pub notes: Option<String>,
    /// When the activity happened; defaults to now
    pub logged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CareLogResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: CareLogId,
    #[schema(value_type = String, format = "uuid")]
    pub job_id: JobId,
    #[schema(value_type = String, format = "uuid")]
    pub caregiver_id: UserId,
    pub activity: String,
    pub notes: Option<String>,
    pub logged_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Query parameters for listing care logs
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListCareLogsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Filter by job
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub job_id: Option<JobId>,
}

impl From<CareLogDBResponse> for CareLogResponse {
    fn from(db: CareLogDBResponse) -> Self {
        Self {
            id: db.id,
            job_id: db.job_id,
            caregiver_id: db.caregiver_id,
            activity: db.activity,
            notes: db.notes,
            logged_at: db.logged_at,
            created_at: db.created_at,
        }
    }
}
