//! Database repository for care jobs.

use crate::api::models::jobs::JobStatus;
use crate::types::{abbrev_uuid, AgencyId, JobId, UserId};
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::jobs::{JobCreateDBRequest, JobDBResponse, JobUpdateDBRequest},
};
use sqlx::{Connection, PgConnection};
use tracing::instrument;

/// Filter for listing jobs
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub skip: i64,
    pub limit: i64,
    pub status: Option<JobStatus>,
    pub guardian_id: Option<UserId>,
    pub caregiver_id: Option<UserId>,
    pub agency_id: Option<AgencyId>,
}

pub struct Jobs<'c> {
    db: &'c mut PgConnection,
}

const LIST_FILTER: &str = r#"
    ($1::job_status IS NULL OR status = $1)
    AND ($2::uuid IS NULL OR guardian_id = $2)
    AND ($3::uuid IS NULL OR caregiver_id = $3)
    AND ($4::uuid IS NULL OR agency_id = $4)
"#;

#[async_trait::async_trait]
impl<'c> Repository for Jobs<'c> {
    type CreateRequest = JobCreateDBRequest;
    type UpdateRequest = JobUpdateDBRequest;
    type Response = JobDBResponse;
    type Id = JobId;
    type Filter = JobFilter;

    #[instrument(skip(self, request), fields(guardian_id = %abbrev_uuid(&request.guardian_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let job = sqlx::query_as::<_, JobDBResponse>(
            r#"
            INSERT INTO jobs (guardian_id, patient_id, agency_id, description, daily_rate, currency, start_date, end_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(request.guardian_id)
        .bind(request.patient_id)
        .bind(request.agency_id)
        .bind(&request.description)
        .bind(request.daily_rate)
        .bind(&request.currency)
        .bind(request.start_date)
        .bind(request.end_date)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(job)
    }

    #[instrument(skip(self), fields(job_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let job = sqlx::query_as::<_, JobDBResponse>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(job)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let jobs = sqlx::query_as::<_, JobDBResponse>(&format!(
            "SELECT * FROM jobs WHERE {LIST_FILTER} ORDER BY created_at DESC LIMIT $5 OFFSET $6"
        ))
        .bind(filter.status)
        .bind(filter.guardian_id)
        .bind(filter.caregiver_id)
        .bind(filter.agency_id)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(jobs)
    }

    #[instrument(skip(self, filter), err)]
    async fn count(&mut self, filter: &Self::Filter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM jobs WHERE {LIST_FILTER}"))
            .bind(filter.status)
            .bind(filter.guardian_id)
            .bind(filter.caregiver_id)
            .bind(filter.agency_id)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }

    #[instrument(skip(self), fields(job_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(job_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let job = sqlx::query_as::<_, JobDBResponse>(
            r#"
            UPDATE jobs SET
                description = COALESCE($2, description),
                daily_rate = COALESCE($3, daily_rate),
                start_date = COALESCE($4, start_date),
                end_date = COALESCE($5, end_date),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.description)
        .bind(request.daily_rate)
        .bind(request.start_date)
        .bind(request.end_date)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(job)
    }
}

impl<'c> Jobs<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Assign a caregiver to a job. Only pending jobs accept assignment; the
    /// guarded update keeps two racing assignments from clobbering each other.
    #[instrument(skip(self), fields(job_id = %abbrev_uuid(&id), caregiver_id = %abbrev_uuid(&caregiver_id)), err)]
    pub async fn assign_caregiver(&mut self, id: JobId, caregiver_id: UserId) -> Result<JobDBResponse> {
        let job = sqlx::query_as::<_, JobDBResponse>(
            r#"
            UPDATE jobs SET caregiver_id = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(caregiver_id)
        .fetch_optional(&mut *self.db)
        .await?;

        match job {
            Some(job) => Ok(job),
            None => {
                let existing = self.get_by_id(id).await?.ok_or(DbError::NotFound)?;
                Err(DbError::InvalidState {
                    entity_type: "job".to_string(),
                    expected: JobStatus::Pending.to_string(),
                    actual: existing.status.to_string(),
                })
            }
        }
    }

    /// Move a job through its lifecycle. The current status is locked for the
    /// duration of the check so concurrent transitions serialize.
    #[instrument(skip(self), fields(job_id = %abbrev_uuid(&id), status = ?new_status), err)]
    pub async fn set_status(&mut self, id: JobId, new_status: JobStatus) -> Result<JobDBResponse> {
        let mut tx = self.db.begin().await?;

        let current = sqlx::query_scalar::<_, JobStatus>("SELECT status FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound)?;

        if !current.can_transition_to(new_status) {
            return Err(DbError::InvalidState {
                entity_type: "job".to_string(),
                expected: format!("a status able to move to {new_status}"),
                actual: current.to_string(),
            });
        }

        let job = sqlx::query_as::<_, JobDBResponse>(
            "UPDATE jobs SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(new_status)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(job)
    }
}
