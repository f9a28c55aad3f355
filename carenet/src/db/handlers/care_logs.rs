//! Database repository for care logs.

use crate::types::{abbrev_uuid, CareLogId, JobId, UserId};
use crate::db::{
    errors::Result,
    models::care_logs::{CareLogCreateDBRequest, CareLogDBResponse},
};
use sqlx::PgConnection;
use tracing::instrument;

/// Filter for listing care logs
#[derive(Debug, Clone, Default)]
pub struct CareLogFilter {
    pub skip: i64,
    pub limit: i64,
    pub job_id: Option<JobId>,
    pub caregiver_id: Option<UserId>,
}

pub struct CareLogs<'c> {
    db: &'c mut PgConnection,
}

const LIST_FILTER: &str = r#"
    ($1::uuid IS NULL OR job_id = $1)
    AND ($2::uuid IS NULL OR caregiver_id = $2)
"#;

impl<'c> CareLogs<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(job_id = %abbrev_uuid(&request.job_id)), err)]
    pub async fn create(&mut self, request: &CareLogCreateDBRequest) -> Result<CareLogDBResponse> {
        let entry = sqlx::query_as::<_, CareLogDBResponse>(
            r#"
            INSERT INTO care_logs (job_id, caregiver_id, activity, notes, logged_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(request.job_id)
        .bind(request.caregiver_id)
        .bind(&request.activity)
        .bind(&request.notes)
        .bind(request.logged_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(entry)
    }

    #[instrument(skip(self), fields(care_log_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: CareLogId) -> Result<Option<CareLogDBResponse>> {
        let entry = sqlx::query_as::<_, CareLogDBResponse>("SELECT * FROM care_logs WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(entry)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &CareLogFilter) -> Result<Vec<CareLogDBResponse>> {
        let entries = sqlx::query_as::<_, CareLogDBResponse>(&format!(
            "SELECT * FROM care_logs WHERE {LIST_FILTER} ORDER BY logged_at DESC LIMIT $3 OFFSET $4"
        ))
        .bind(filter.job_id)
        .bind(filter.caregiver_id)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(entries)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &CareLogFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM care_logs WHERE {LIST_FILTER}"))
            .bind(filter.job_id)
            .bind(filter.caregiver_id)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }
}
