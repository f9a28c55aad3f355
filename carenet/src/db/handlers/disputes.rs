//! Database repository for disputes.
//!
//! Disputes are opened and resolved through [`super::escrow::Escrows`], which
//! owns the coupled escrow transitions. This repository is the read side.

use crate::api::models::disputes::DisputeStatus;
use crate::types::{abbrev_uuid, DisputeId, UserId};
use crate::db::{errors::Result, models::disputes::DisputeDBResponse};
use sqlx::PgConnection;
use tracing::instrument;

/// Filter for listing disputes
#[derive(Debug, Clone, Default)]
pub struct DisputeFilter {
    pub skip: i64,
    pub limit: i64,
    pub status: Option<DisputeStatus>,
    /// Restrict to disputes on jobs this user participates in
    pub party: Option<UserId>,
}

pub struct Disputes<'c> {
    db: &'c mut PgConnection,
}

const LIST_FILTER: &str = r#"
    ($1::dispute_status IS NULL OR d.status = $1)
    AND ($2::uuid IS NULL OR d.opened_by = $2 OR EXISTS (
        SELECT 1 FROM jobs j
        LEFT JOIN agencies a ON a.id = j.agency_id
        WHERE j.id = d.job_id
          AND (j.guardian_id = $2 OR j.caregiver_id = $2 OR a.owner_id = $2)))
"#;

impl<'c> Disputes<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(dispute_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: DisputeId) -> Result<Option<DisputeDBResponse>> {
        let dispute = sqlx::query_as::<_, DisputeDBResponse>("SELECT * FROM disputes WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(dispute)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &DisputeFilter) -> Result<Vec<DisputeDBResponse>> {
        let disputes = sqlx::query_as::<_, DisputeDBResponse>(&format!(
            "SELECT d.* FROM disputes d WHERE {LIST_FILTER} ORDER BY d.created_at DESC LIMIT $3 OFFSET $4"
        ))
        .bind(filter.status)
        .bind(filter.party)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(disputes)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &DisputeFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM disputes d WHERE {LIST_FILTER}"))
            .bind(filter.status)
            .bind(filter.party)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::Escrows;
    use crate::db::models::disputes::DisputeCreateDBRequest;
    use crate::test_utils::{create_completed_payment, create_guardian};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_open_disputes_for_party(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "disp_guardian1").await;
        let other = create_guardian(&mut conn, "disp_guardian2").await;
        let (payment, job) = create_completed_payment(&mut conn, &guardian).await;

        let mut escrows = Escrows::new(&mut conn);
        let escrow = escrows.hold(payment.id, guardian.id).await.unwrap();
        let dispute = escrows
            .open_dispute(&DisputeCreateDBRequest {
                escrow_id: escrow.id,
                job_id: job.id,
                opened_by: guardian.id,
                reason: "service not rendered".to_string(),
                description: None,
                evidence: vec![],
            })
            .await
            .unwrap();

        let mut repo = Disputes::new(&mut conn);
        let filter = DisputeFilter {
            status: Some(DisputeStatus::Open),
            party: Some(guardian.id),
            limit: 10,
            ..Default::default()
        };
        let listed = repo.list(&filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, dispute.id);

        let empty = repo
            .list(&DisputeFilter {
                party: Some(other.id),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(empty.is_empty());
    }
}
