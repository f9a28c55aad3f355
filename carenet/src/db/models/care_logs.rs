//! Database models for care logs.

use crate::types::{CareLogId, JobId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for recording a care activity
#[derive(Debug, Clone)]
pub struct CareLogCreateDBRequest {
    pub job_id: JobId,
    pub caregiver_id: UserId,
    pub activity: String,
    pub notes: Option<String>,
    pub logged_at: DateTime<Utc>,
}

/// Database response for a care log entry
#[derive(Debug, Clone, FromRow)]
pub struct CareLogDBResponse {
    pub id: CareLogId,
    pub job_id: JobId,
    pub caregiver_id: UserId,
    pub activity: String,
    pub notes: Option<String>,
    pub logged_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
