//! API request/response models for escrow transactions.

use super::pagination::Pagination;
use crate::db::models::escrow::EscrowDBResponse;
use crate::types::{DisputeId, EscrowId, JobId, PaymentId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Escrow hold lifecycle.
///
/// HELD is the only state transitions start from: HELD -> RELEASED,
/// HELD -> REFUNDED, HELD -> DISPUTED. A disputed hold settles to
/// RELEASED or REFUNDED when the dispute is resolved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "escrow_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum EscrowStatus {
    Held,
    Released,
    Refunded,
    Disputed,
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EscrowStatus::Held => "HELD",
            EscrowStatus::Released => "RELEASED",
            EscrowStatus::Refunded => "REFUNDED",
            EscrowStatus::Disputed => "DISPUTED",
        };
        write!(f, "{s}")
    }
}

/// Manual escrow hold creation (moderator/admin only; holds are normally
/// created automatically when a payment is confirmed).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EscrowCreate {
    #[schema(value_type = String, format = "uuid")]
    pub payment_id: PaymentId,
}

/// Body for release and refund actions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct EscrowActionRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EscrowResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: EscrowId,
    #[schema(value_type = String, format = "uuid")]
    pub payment_id: PaymentId,
    #[schema(value_type = String, format = "uuid")]
    pub job_id: JobId,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub currency: String,
    pub status: EscrowStatus,
    pub held_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub action_reason: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub action_by: Option<UserId>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub dispute_id: Option<DisputeId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Query parameters for listing escrow transactions
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListEscrowsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Filter by escrow status
    pub status: Option<EscrowStatus>,
}

impl From<EscrowDBResponse> for EscrowResponse {
    fn from(db: EscrowDBResponse) -> Self {
        Self {
            id: db.id,
            payment_id: db.payment_id,
            job_id: db.job_id,
            amount: db.amount,
            currency: db.currency,
            status: db.status,
            held_at: db.held_at,
            released_at: db.released_at,
            refunded_at: db.refunded_at,
            action_reason: db.action_reason,
            action_by: db.action_by,
            dispute_id: db.dispute_id,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
