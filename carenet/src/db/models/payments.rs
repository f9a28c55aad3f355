//! Database models for payments.

use crate::api::models::payments::{PaymentMethod, PaymentStatus};
use crate::types::{JobId, PaymentId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

/// Database request for creating a payment
#[derive(Debug, Clone)]
pub struct PaymentCreateDBRequest {
    pub job_id: JobId,
    pub payer_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub invoice_number: String,
}

/// Database response for a payment
#[derive(Debug, Clone, FromRow)]
pub struct PaymentDBResponse {
    pub id: PaymentId,
    pub job_id: JobId,
    pub payer_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub invoice_number: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
