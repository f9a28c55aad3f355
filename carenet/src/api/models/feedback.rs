//! API request/response models for job feedback.

use super::pagination::Pagination;
use crate::db::models::feedback::FeedbackDBResponse;
use crate::types::{FeedbackId, JobId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FeedbackCreate {
    #[schema(value_type = String, format = "uuid")]
    pub job_id: JobId,
    #[schema(value_type = String, format = "uuid")]
    pub recipient_id: UserId,
    /// Rating from 1 to 5
    #[schema(minimum = 1, maximum = 5)]
    pub rating: i32,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FeedbackResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: FeedbackId,
    #[schema(value_type = String, format = "uuid")]
    pub job_id: JobId,
    #[schema(value_type = String, format = "uuid")]
    pub author_id: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub recipient_id: UserId,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Query parameters for listing feedback
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListFeedbackQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Filter by job
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub job_id: Option<JobId>,

    /// Filter by recipient (e.g. all reviews of a caregiver)
    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub recipient_id: Option<UserId>,
}

impl From<FeedbackDBResponse> for FeedbackResponse {
    fn from(db: FeedbackDBResponse) -> Self {
        Self {
            id: db.id,
            job_id: db.job_id,
            author_id: db.author_id,
            recipient_id: db.recipient_id,
            rating: db.rating,
            comment: db.comment,
            created_at: db.created_at,
        }
    }
}
