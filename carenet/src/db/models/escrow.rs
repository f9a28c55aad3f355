//! Database models for escrow transactions.

use crate::api::models::escrow::EscrowStatus;
use crate::types::{DisputeId, EscrowId, JobId, PaymentId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

/// Database response for an escrow transaction
#[derive(Debug, Clone, FromRow)]
pub struct EscrowDBResponse {
    pub id: EscrowId,
    pub payment_id: PaymentId,
    pub job_id: JobId,
    pub amount: Decimal,
    pub currency: String,
    pub status: EscrowStatus,
    pub held_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub action_reason: Option<String>,
    pub action_by: Option<UserId>,
    pub dispute_id: Option<DisputeId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An escrow row joined with the job it funds, used for ownership checks
#[derive(Debug, Clone, FromRow)]
pub struct EscrowWithPartiesDBResponse {
    pub id: EscrowId,
    pub payment_id: PaymentId,
    pub job_id: JobId,
    pub amount: Decimal,
    pub currency: String,
    pub status: EscrowStatus,
    pub held_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub action_reason: Option<String>,
    pub action_by: Option<UserId>,
    pub dispute_id: Option<DisputeId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub guardian_id: UserId,
    pub caregiver_id: Option<UserId>,
    pub agency_owner_id: Option<UserId>,
}
