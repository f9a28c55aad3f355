//! Database models for job feedback.

use crate::types::{FeedbackId, JobId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for leaving feedback on a completed job
#[derive(Debug, Clone)]
pub struct FeedbackCreateDBRequest {
    pub job_id: JobId,
    pub author_id: UserId,
    pub recipient_id: UserId,
    pub rating: i32,
    pub comment: Option<String>,
}

/// Database response for feedback
#[derive(Debug, Clone, FromRow)]
pub struct FeedbackDBResponse {
    pub id: FeedbackId,
    pub job_id: JobId,
    pub author_id: UserId,
    pub recipient_id: UserId,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
