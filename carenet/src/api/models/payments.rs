//! API request/response models for payments.

use super::pagination::Pagination;
use crate::db::models::payments::PaymentDBResponse;
use crate::types::{JobId, PaymentId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "payment_method", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    Bkash,
    Nagad,
    Card,
    Bank,
}

/// Payment lifecycle.
///
/// PENDING -> COMPLETED (gateway confirmed) -> ESCROW (hold created), then
/// RELEASED or REFUNDED when the escrow settles. FAILED is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "payment_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Escrow,
    Released,
    Refunded,
    Failed,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Escrow => "ESCROW",
            PaymentStatus::Released => "RELEASED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentCreate {
    #[schema(value_type = String, format = "uuid")]
    pub job_id: JobId,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PaymentId,
    #[schema(value_type = String, format = "uuid")]
    pub job_id: JobId,
    #[schema(value_type = String, format = "uuid")]
    pub payer_id: UserId,
    #[schema(value_type = String)]
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

/// Response for payment creation: the pending payment plus the gateway
/// redirect URL, when the provider uses a hosted checkout page.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentCreatedResponse {
    pub payment: PaymentResponse,
    #[schema(value_type = Option<String>, format = "uri")]
    pub redirect_url: Option<Url>,
}

/// Query parameters for listing payments
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListPaymentsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Filter by payment status
    pub status: Option<PaymentStatus>,

    /// Filter by payment method
    pub method: Option<PaymentMethod>,

    /// Search by invoice number or gateway transaction id (case-insensitive substring match)
    pub search: Option<String>,
}

impl From<PaymentDBResponse> for PaymentResponse {
    fn from(db: PaymentDBResponse) -> Self {
        Self {
            id: db.id,
            job_id: db.job_id,
            payer_id: db.payer_id,
            amount: db.amount,
            currency: db.currency,
            method: db.method,
            status: db.status,
            transaction_id: db.transaction_id,
            invoice_number: db.invoice_number,
            paid_at: db.paid_at,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
