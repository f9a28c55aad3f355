//! API request/response models for disputes.

use super::pagination::Pagination;
use crate::db::models::disputes::DisputeDBResponse;
use crate::types::{DisputeId, EscrowId, JobId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "dispute_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DisputeStatus {
    Open,
    Resolved,
}

/// How a resolved dispute settles the escrow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "dispute_resolution", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DisputeResolution {
    Release,
    Refund,
}

/// Body for opening a dispute against a held escrow.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DisputeOpenRequest {
    pub reason: String,
    pub description: Option<String>,
    /// Evidence references (URLs or document identifiers)
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// Body for resolving a dispute (moderator/admin only).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DisputeResolveRequest {
    pub resolution: DisputeResolution,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DisputeResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: DisputeId,
    #[schema(value_type = String, format = "uuid")]
    pub escrow_id: EscrowId,
    #[schema(value_type = String, format = "uuid")]
    pub job_id: JobId,
    #[schema(value_type = String, format = "uuid")]
    pub opened_by: UserId,
    pub reason: String,
    pub description: Option<String>,
    pub evidence: Vec<String>,
    pub status: DisputeStatus,
    pub resolution: Option<DisputeResolution>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Query parameters for listing disputes
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListDisputesQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Filter by dispute status
    pub status: Option<DisputeStatus>,
}

impl From<DisputeDBResponse> for DisputeResponse {
    fn from(db: DisputeDBResponse) -> Self {
        Self {
            id: db.id,
            escrow_id: db.escrow_id,
            job_id: db.job_id,
            opened_by: db.opened_by,
            reason: db.reason,
            description: db.description,
            evidence: db.evidence,
            status: db.status,
            resolution: db.resolution,
            resolved_by: db.resolved_by,
            resolved_at: db.resolved_at,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
