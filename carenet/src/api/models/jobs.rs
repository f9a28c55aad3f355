//! API request/response models for care jobs.

use super::pagination::Pagination;
use crate::db::models::jobs::JobDBResponse;
use crate::types::{AgencyId, JobId, PatientId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Lifecycle of a care job.
///
/// Valid transitions: PENDING -> ACTIVE -> COMPLETED, and
/// PENDING/ACTIVE -> CANCELLED.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "job_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl JobStatus {
    /// Whether a transition to `next` is allowed from this status.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Active)
                | (JobStatus::Active, JobStatus::Completed)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Active, JobStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Active => "ACTIVE",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobCreate {
    #[schema(value_type = String, format = "uuid")]
    pub patient_id: PatientId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub agency_id: Option<AgencyId>,
    pub description: String,
    #[schema(value_type = String)]
    pub daily_rate: Decimal,
    /// Defaults to the configured currency (BDT) when omitted
    pub currency: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobUpdate {
    pub description: Option<String>,
    #[schema(value_type = Option<String>)]
    pub daily_rate: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignCaregiverRequest {
    #[schema(value_type = String, format = "uuid")]
    pub caregiver_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobStatusUpdate {
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: JobId,
    #[schema(value_type = String, format = "uuid")]
    pub guardian_id: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub patient_id: PatientId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub agency_id: Option<AgencyId>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub caregiver_id: Option<UserId>,
    pub description: String,
    #[schema(value_type = String)]
    pub daily_rate: Decimal,
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListJobsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Filter by job status
    pub status: Option<JobStatus>,
}

impl From<JobDBResponse> for JobResponse {
    fn from(db: JobDBResponse) -> Self {
        Self {
            id: db.id,
            guardian_id: db.guardian_id,
            patient_id: db.patient_id,
            agency_id: db.agency_id,
            caregiver_id: db.caregiver_id,
            description: db.description,
            daily_rate: db.daily_rate,
            currency: db.currency,
            start_date: db.start_date,
            end_date: db.end_date,
            status: db.status,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Active));
        assert!(JobStatus::Active.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Active.can_transition_to(JobStatus::Cancelled));

        // No going backwards or out of terminal states
        assert!(!JobStatus::Active.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Active));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Active));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
    }
}
