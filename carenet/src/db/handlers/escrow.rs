//! The escrow engine.
//!
//! Every transition runs as a single transaction: the state guard, the
//! payment flip, and the audit entry commit together or not at all. The
//! guarded `UPDATE ... WHERE status = ...` shape means concurrent attempts
//! on the same hold serialize on the row; the loser sees a state it cannot
//! transition from and gets [`DbError::InvalidState`], never a double
//! release.
//!
//! Methods open their own transaction, which becomes a savepoint when the
//! repository is constructed from an outer transaction. Refunds rely on
//! that: the handler wraps `refund` and the gateway call in one outer
//! transaction so a gateway failure rolls the transition back.

use crate::api::models::disputes::DisputeResolution;
use crate::api::models::escrow::EscrowStatus;
use crate::api::models::payments::PaymentStatus;
use crate::types::{abbrev_uuid, DisputeId, EscrowId, PaymentId, UserId};
use crate::db::{
    errors::{DbError, Result},
    handlers::audit::AuditLog,
    models::{
        audit::AuditEntryDBRequest,
        disputes::{DisputeCreateDBRequest, DisputeDBResponse},
        escrow::{EscrowDBResponse, EscrowWithPartiesDBResponse},
        payments::PaymentDBResponse,
    },
};
use sqlx::{Connection, PgConnection, Postgres, Transaction};
use tracing::instrument;

/// Filter for listing escrow transactions
#[derive(Debug, Clone, Default)]
pub struct EscrowFilter {
    pub skip: i64,
    pub limit: i64,
    pub status: Option<EscrowStatus>,
    /// Restrict to escrows on jobs this user participates in, as guardian,
    /// caregiver, or agency owner
    pub party: Option<UserId>,
}

pub struct Escrows<'c> {
    db: &'c mut PgConnection,
}

const LIST_FILTER: &str = r#"
    ($1::escrow_status IS NULL OR e.status = $1)
    AND ($2::uuid IS NULL OR EXISTS (
        SELECT 1 FROM jobs j
        LEFT JOIN agencies a ON a.id = j.agency_id
        WHERE j.id = e.job_id
          AND (j.guardian_id = $2 OR j.caregiver_id = $2 OR a.owner_id = $2)))
"#;

async fn audit(
    tx: &mut Transaction<'_, Postgres>,
    escrow: &EscrowDBResponse,
    actor_id: UserId,
    action: &str,
    description: String,
) -> Result<()> {
    let entry = AuditEntryDBRequest::new("escrow", escrow.id, action, description)
        .actor(actor_id)
        .metadata(serde_json::json!({
            "payment_id": escrow.payment_id,
            "amount": escrow.amount,
            "currency": escrow.currency,
            "status": escrow.status,
        }));
    AuditLog::new(tx).append(&entry).await?;
    Ok(())
}

/// Guarded escrow transition away from `expected`. Zero rows updated is
/// resolved into not-found or a state conflict by a follow-up read.
async fn transition(
    tx: &mut Transaction<'_, Postgres>,
    id: EscrowId,
    expected: EscrowStatus,
    update_sql: &str,
    actor_id: UserId,
    reason: Option<&str>,
) -> Result<EscrowDBResponse> {
    let escrow = sqlx::query_as::<_, EscrowDBResponse>(update_sql)
        .bind(id)
        .bind(actor_id)
        .bind(reason)
        .fetch_optional(&mut **tx)
        .await?;

    match escrow {
        Some(escrow) => Ok(escrow),
        None => {
            let actual = sqlx::query_scalar::<_, EscrowStatus>("SELECT status FROM escrow_transactions WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or(DbError::NotFound)?;
            Err(DbError::InvalidState {
                entity_type: "escrow".to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            })
        }
    }
}

async fn flip_payment(
    tx: &mut Transaction<'_, Postgres>,
    payment_id: PaymentId,
    status: PaymentStatus,
) -> Result<PaymentDBResponse> {
    let payment = sqlx::query_as::<_, PaymentDBResponse>(
        "UPDATE payments SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(payment_id)
    .bind(status)
    .fetch_one(&mut **tx)
    .await?;
    Ok(payment)
}

impl<'c> Escrows<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(escrow_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: EscrowId) -> Result<Option<EscrowDBResponse>> {
        let escrow = sqlx::query_as::<_, EscrowDBResponse>("SELECT * FROM escrow_transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(escrow)
    }

    /// Fetch an escrow joined with the parties of the job it funds, for
    /// ownership checks in handlers.
    #[instrument(skip(self), fields(escrow_id = %abbrev_uuid(&id)), err)]
    pub async fn get_with_parties(&mut self, id: EscrowId) -> Result<Option<EscrowWithPartiesDBResponse>> {
        let escrow = sqlx::query_as::<_, EscrowWithPartiesDBResponse>(
            r#"
            SELECT e.*, j.guardian_id, j.caregiver_id, a.owner_id AS agency_owner_id
            FROM escrow_transactions e
            JOIN jobs j ON j.id = e.job_id
            LEFT JOIN agencies a ON a.id = j.agency_id
            WHERE e.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(escrow)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &EscrowFilter) -> Result<Vec<EscrowDBResponse>> {
        let escrows = sqlx::query_as::<_, EscrowDBResponse>(&format!(
            "SELECT e.* FROM escrow_transactions e WHERE {LIST_FILTER} ORDER BY e.created_at DESC LIMIT $3 OFFSET $4"
        ))
        .bind(filter.status)
        .bind(filter.party)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(escrows)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &EscrowFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM escrow_transactions e WHERE {LIST_FILTER}"
        ))
        .bind(filter.status)
        .bind(filter.party)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }

    /// Hold a confirmed payment in escrow.
    ///
    /// Locks the payment row, requires it to be `COMPLETED`, inserts the
    /// hold, and flips the payment to `ESCROW`. The UNIQUE payment reference
    /// turns a retry into a unique violation rather than a second hold.
    #[instrument(skip(self), fields(payment_id = %abbrev_uuid(&payment_id)), err)]
    pub async fn hold(&mut self, payment_id: PaymentId, actor_id: UserId) -> Result<EscrowDBResponse> {
        let mut tx = self.db.begin().await?;

        let payment = sqlx::query_as::<_, PaymentDBResponse>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
            .bind(payment_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound)?;

        if payment.status != PaymentStatus::Completed {
            return Err(DbError::InvalidState {
                entity_type: "payment".to_string(),
                expected: PaymentStatus::Completed.to_string(),
                actual: payment.status.to_string(),
            });
        }

        let escrow = sqlx::query_as::<_, EscrowDBResponse>(
            r#"
            INSERT INTO escrow_transactions (payment_id, job_id, amount, currency)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(payment.id)
        .bind(payment.job_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .fetch_one(&mut *tx)
        .await?;

        flip_payment(&mut tx, payment.id, PaymentStatus::Escrow).await?;
        audit(
            &mut tx,
            &escrow,
            actor_id,
            "escrow.hold",
            format!("held payment {} in escrow", payment.invoice_number),
        )
        .await?;

        tx.commit().await?;
        Ok(escrow)
    }

    /// Release a held escrow to the caregiver side.
    #[instrument(skip(self, reason), fields(escrow_id = %abbrev_uuid(&id)), err)]
    pub async fn release(&mut self, id: EscrowId, actor_id: UserId, reason: Option<&str>) -> Result<EscrowDBResponse> {
        let mut tx = self.db.begin().await?;

        let escrow = transition(
            &mut tx,
            id,
            EscrowStatus::Held,
            r#"
            UPDATE escrow_transactions SET
                status = 'RELEASED', released_at = NOW(),
                action_by = $2, action_reason = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'HELD'
            RETURNING *
            "#,
            actor_id,
            reason,
        )
        .await?;

        flip_payment(&mut tx, escrow.payment_id, PaymentStatus::Released).await?;
        audit(&mut tx, &escrow, actor_id, "escrow.release", "released escrow funds".to_string()).await?;

        tx.commit().await?;
        Ok(escrow)
    }

    /// Refund a held escrow back to the payer.
    ///
    /// Returns the flipped payment so the caller can issue the gateway
    /// refund before committing its outer transaction.
    #[instrument(skip(self, reason), fields(escrow_id = %abbrev_uuid(&id)), err)]
    pub async fn refund(
        &mut self,
        id: EscrowId,
        actor_id: UserId,
        reason: Option<&str>,
    ) -> Result<(EscrowDBResponse, PaymentDBResponse)> {
        let mut tx = self.db.begin().await?;

        let escrow = transition(
            &mut tx,
            id,
            EscrowStatus::Held,
            r#"
            UPDATE escrow_transactions SET
                status = 'REFUNDED', refunded_at = NOW(),
                action_by = $2, action_reason = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'HELD'
            RETURNING *
            "#,
            actor_id,
            reason,
        )
        .await?;

        let payment = flip_payment(&mut tx, escrow.payment_id, PaymentStatus::Refunded).await?;
        audit(&mut tx, &escrow, actor_id, "escrow.refund", "refunded escrow funds".to_string()).await?;

        tx.commit().await?;
        Ok((escrow, payment))
    }

    /// Open a dispute over a held escrow, moving it to `DISPUTED`.
    #[instrument(skip(self, request), fields(escrow_id = %abbrev_uuid(&request.escrow_id)), err)]
    pub async fn open_dispute(&mut self, request: &DisputeCreateDBRequest) -> Result<DisputeDBResponse> {
        let mut tx = self.db.begin().await?;

        let status = sqlx::query_scalar::<_, EscrowStatus>(
            "SELECT status FROM escrow_transactions WHERE id = $1 FOR UPDATE",
        )
        .bind(request.escrow_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;

        if status != EscrowStatus::Held {
            return Err(DbError::InvalidState {
                entity_type: "escrow".to_string(),
                expected: EscrowStatus::Held.to_string(),
                actual: status.to_string(),
            });
        }

        let dispute = sqlx::query_as::<_, DisputeDBResponse>(
            r#"
            INSERT INTO disputes (escrow_id, job_id, opened_by, reason, description, evidence)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(request.escrow_id)
        .bind(request.job_id)
        .bind(request.opened_by)
        .bind(&request.reason)
        .bind(&request.description)
        .bind(&request.evidence)
        .fetch_one(&mut *tx)
        .await?;

        let escrow = sqlx::query_as::<_, EscrowDBResponse>(
            r#"
            UPDATE escrow_transactions SET status = 'DISPUTED', dispute_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(request.escrow_id)
        .bind(dispute.id)
        .fetch_one(&mut *tx)
        .await?;

        audit(
            &mut tx,
            &escrow,
            request.opened_by,
            "escrow.dispute",
            format!("dispute opened: {}", request.reason),
        )
        .await?;

        tx.commit().await?;
        Ok(dispute)
    }

    /// Resolve an open dispute, settling the escrow per the resolution.
    ///
    /// Returns the payment as well so refund resolutions can call the
    /// gateway before the caller commits its outer transaction.
    #[instrument(skip(self, notes), fields(dispute_id = %abbrev_uuid(&dispute_id), resolution = ?resolution), err)]
    pub async fn resolve_dispute(
        &mut self,
        dispute_id: DisputeId,
        resolver_id: UserId,
        resolution: DisputeResolution,
        notes: Option<&str>,
    ) -> Result<(DisputeDBResponse, EscrowDBResponse, PaymentDBResponse)> {
        let mut tx = self.db.begin().await?;

        let dispute = sqlx::query_as::<_, DisputeDBResponse>(
            r#"
            UPDATE disputes SET
                status = 'RESOLVED', resolution = $2, resolution_notes = $3,
                resolved_by = $4, resolved_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'OPEN'
            RETURNING *
            "#,
        )
        .bind(dispute_id)
        .bind(resolution)
        .bind(notes)
        .bind(resolver_id)
        .fetch_optional(&mut *tx)
        .await?;

        let dispute = match dispute {
            Some(dispute) => dispute,
            None => {
                sqlx::query_scalar::<_, crate::api::models::disputes::DisputeStatus>(
                    "SELECT status FROM disputes WHERE id = $1",
                )
                .bind(dispute_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(DbError::NotFound)?;
                return Err(DbError::InvalidState {
                    entity_type: "dispute".to_string(),
                    expected: "OPEN".to_string(),
                    actual: "RESOLVED".to_string(),
                });
            }
        };

        let (escrow_sql, payment_status, action) = match resolution {
            DisputeResolution::Release => (
                r#"
                UPDATE escrow_transactions SET
                    status = 'RELEASED', released_at = NOW(),
                    action_by = $2, action_reason = $3, updated_at = NOW()
                WHERE id = $1 AND status = 'DISPUTED'
                RETURNING *
                "#,
                PaymentStatus::Released,
                "escrow.resolve_release",
            ),
            DisputeResolution::Refund => (
                r#"
                UPDATE escrow_transactions SET
                    status = 'REFUNDED', refunded_at = NOW(),
                    action_by = $2, action_reason = $3, updated_at = NOW()
                WHERE id = $1 AND status = 'DISPUTED'
                RETURNING *
                "#,
                PaymentStatus::Refunded,
                "escrow.resolve_refund",
            ),
        };

        let escrow = transition(&mut tx, dispute.escrow_id, EscrowStatus::Disputed, escrow_sql, resolver_id, notes).await?;
        let payment = flip_payment(&mut tx, escrow.payment_id, payment_status).await?;
        audit(
            &mut tx,
            &escrow,
            resolver_id,
            action,
            format!("dispute {} resolved", abbrev_uuid(&dispute.id)),
        )
        .await?;

        tx.commit().await?;
        Ok((dispute, escrow, payment))
    }
}
