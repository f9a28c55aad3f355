//! Database repository for payments.

use crate::api::models::payments::{PaymentMethod, PaymentStatus};
use crate::types::{abbrev_uuid, JobId, PaymentId, UserId};
use crate::db::{
    errors::{DbError, Result},
    models::payments::{PaymentCreateDBRequest, PaymentDBResponse},
};
use chrono::Utc;
use rand::Rng;
use sqlx::{Connection, PgConnection};
use tracing::instrument;

/// Filter for listing payments
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub skip: i64,
    pub limit: i64,
    pub status: Option<PaymentStatus>,
    pub method: Option<PaymentMethod>,
    pub payer_id: Option<UserId>,
    pub job_id: Option<JobId>,
    pub search: Option<String>,
}

pub struct Payments<'c> {
    db: &'c mut PgConnection,
}

/// Generate an invoice number like `INV-20260830-483920`.
///
/// Uniqueness is enforced by the database; the random suffix just makes
/// collisions rare enough that callers never see them in practice.
pub fn generate_invoice_number() -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("INV-{date}-{suffix:06}")
}

const LIST_FILTER: &str = r#"
    ($1::payment_status IS NULL OR status = $1)
    AND ($2::payment_method IS NULL OR method = $2)
    AND ($3::uuid IS NULL OR payer_id = $3)
    AND ($4::uuid IS NULL OR job_id = $4)
    AND ($5::text IS NULL OR invoice_number ILIKE '%' || $5 || '%' OR transaction_id ILIKE '%' || $5 || '%')
"#;

impl<'c> Payments<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(job_id = %abbrev_uuid(&request.job_id), invoice = %request.invoice_number), err)]
    pub async fn create(&mut self, request: &PaymentCreateDBRequest) -> Result<PaymentDBResponse> {
        let payment = sqlx::query_as::<_, PaymentDBResponse>(
            r#"
            INSERT INTO payments (job_id, payer_id, amount, currency, method, transaction_id, invoice_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(request.job_id)
        .bind(request.payer_id)
        .bind(request.amount)
        .bind(&request.currency)
        .bind(request.method)
        .bind(&request.transaction_id)
        .bind(&request.invoice_number)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(payment)
    }

    #[instrument(skip(self), fields(payment_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: PaymentId) -> Result<Option<PaymentDBResponse>> {
        let payment = sqlx::query_as::<_, PaymentDBResponse>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(payment)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &PaymentFilter) -> Result<Vec<PaymentDBResponse>> {
        let payments = sqlx::query_as::<_, PaymentDBResponse>(&format!(
            "SELECT * FROM payments WHERE {LIST_FILTER} ORDER BY created_at DESC LIMIT $6 OFFSET $7"
        ))
        .bind(filter.status)
        .bind(filter.method)
        .bind(filter.payer_id)
        .bind(filter.job_id)
        .bind(&filter.search)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(payments)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &PaymentFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM payments WHERE {LIST_FILTER}"))
            .bind(filter.status)
            .bind(filter.method)
            .bind(filter.payer_id)
            .bind(filter.job_id)
            .bind(&filter.search)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }

    /// Mark a pending payment as gateway-confirmed. The guarded transition
    /// keeps a double confirm from overwriting the original transaction id.
    #[instrument(skip(self, transaction_id), fields(payment_id = %abbrev_uuid(&id)), err)]
    pub async fn confirm(&mut self, id: PaymentId, transaction_id: &str) -> Result<PaymentDBResponse> {
        let mut tx = self.db.begin().await?;

        let payment = sqlx::query_as::<_, PaymentDBResponse>(
            r#"
            UPDATE payments SET
                status = 'COMPLETED',
                transaction_id = $2,
                paid_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?;

        let payment = match payment {
            Some(payment) => payment,
            None => {
                let existing = sqlx::query_scalar::<_, PaymentStatus>("SELECT status FROM payments WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or(DbError::NotFound)?;
                return Err(DbError::InvalidState {
                    entity_type: "payment".to_string(),
                    expected: PaymentStatus::Pending.to_string(),
                    actual: existing.to_string(),
                });
            }
        };

        tx.commit().await?;
        Ok(payment)
    }

    /// Mark a pending payment as failed after the gateway declined it.
    /// Zero rows updated is resolved into not-found or a state conflict by
    /// a follow-up read, like `confirm`.
    #[instrument(skip(self), fields(payment_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_failed(&mut self, id: PaymentId) -> Result<PaymentDBResponse> {
        let payment = sqlx::query_as::<_, PaymentDBResponse>(
            r#"
            UPDATE payments SET status = 'FAILED', updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        match payment {
            Some(payment) => Ok(payment),
            None => {
                let existing = sqlx::query_scalar::<_, PaymentStatus>("SELECT status FROM payments WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut *self.db)
                    .await?
                    .ok_or(DbError::NotFound)?;
                Err(DbError::InvalidState {
                    entity_type: "payment".to_string(),
                    expected: PaymentStatus::Pending.to_string(),
                    actual: existing.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_guardian, create_job, create_patient, create_payment};
    use sqlx::PgPool;

    #[test]
    fn test_invoice_number_shape() {
        let invoice = generate_invoice_number();
        assert!(invoice.starts_with("INV-"));
        assert_eq!(invoice.len(), "INV-20260830-000000".len());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_payment_pending(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "pay_guardian1").await;
        let patient = create_patient(&mut conn, guardian.id).await;
        let job = create_job(&mut conn, guardian.id, patient.id).await;

        let payment = create_payment(&mut conn, job.id, guardian.id).await;
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.transaction_id.is_none());
        assert!(payment.paid_at.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_confirm_is_guarded(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "pay_guardian2").await;
        let patient = create_patient(&mut conn, guardian.id).await;
        let job = create_job(&mut conn, guardian.id, patient.id).await;
        let payment = create_payment(&mut conn, job.id, guardian.id).await;

        let mut repo = Payments::new(&mut conn);
        let confirmed = repo.confirm(payment.id, "TXN-123").await.unwrap();
        assert_eq!(confirmed.status, PaymentStatus::Completed);
        assert_eq!(confirmed.transaction_id.as_deref(), Some("TXN-123"));
        assert!(confirmed.paid_at.is_some());

        // Second confirm does not overwrite the transaction id
        let err = repo.confirm(payment.id, "TXN-456").await.unwrap_err();
        assert!(matches!(err, DbError::InvalidState { .. }));
        let unchanged = repo.get_by_id(payment.id).await.unwrap().unwrap();
        assert_eq!(unchanged.transaction_id.as_deref(), Some("TXN-123"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_mark_failed_is_guarded(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "pay_guardian4").await;
        let patient = create_patient(&mut conn, guardian.id).await;
        let job = create_job(&mut conn, guardian.id, patient.id).await;
        let payment = create_payment(&mut conn, job.id, guardian.id).await;

        let mut repo = Payments::new(&mut conn);
        repo.confirm(payment.id, "TXN-789").await.unwrap();

        // A settled payment cannot be failed; the state leaks into the error
        let err = repo.mark_failed(payment.id).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::InvalidState { ref actual, .. } if actual == "COMPLETED"
        ));

        let err = repo.mark_failed(uuid::Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_transaction_id_rejected(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "pay_guardian3").await;
        let patient = create_patient(&mut conn, guardian.id).await;
        let job = create_job(&mut conn, guardian.id, patient.id).await;
        let first = create_payment(&mut conn, job.id, guardian.id).await;
        let second = create_payment(&mut conn, job.id, guardian.id).await;

        let mut repo = Payments::new(&mut conn);
        repo.confirm(first.id, "TXN-DUP").await.unwrap();
        let err = repo.confirm(second.id, "TXN-DUP").await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }
}
