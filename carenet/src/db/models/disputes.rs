//! Database models for disputes.

use crate::api::models::disputes::{DisputeResolution, DisputeStatus};
use crate::types::{DisputeId, EscrowId, JobId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for opening a dispute
#[derive(Debug, Clone)]
pub struct DisputeCreateDBRequest {
    pub escrow_id: EscrowId,
    pub job_id: JobId,
    pub opened_by: UserId,
    pub reason: String,
    pub description: Option<String>,
    pub evidence: Vec<String>,
}

/// Database response for a dispute
#[derive(Debug, Clone, FromRow)]
pub struct DisputeDBResponse {
    pub id: DisputeId,
    pub escrow_id: EscrowId,
    pub job_id: JobId,
    pub opened_by: UserId,
    pub reason: String,
    pub description: Option<String>,
    pub evidence: Vec<String>,
    pub status: DisputeStatus,
    pub resolution: Option<DisputeResolution>,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
