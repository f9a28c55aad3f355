//! Database repository for job feedback.

use crate::types::{abbrev_uuid, FeedbackId, JobId, UserId};
use crate::db::{
    errors::Result,
    models::feedback::{FeedbackCreateDBRequest, FeedbackDBResponse},
};
use sqlx::PgConnection;
use tracing::instrument;

/// Filter for listing feedback
#[derive(Debug, Clone, Default)]
pub struct FeedbackFilter {
    pub skip: i64,
    pub limit: i64,
    pub job_id: Option<JobId>,
    pub recipient_id: Option<UserId>,
}

pub struct Feedback<'c> {
    db: &'c mut PgConnection,
}

const LIST_FILTER: &str = r#"
    ($1::uuid IS NULL OR job_id = $1)
    AND ($2::uuid IS NULL OR recipient_id = $2)
"#;

impl<'c> Feedback<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(job_id = %abbrev_uuid(&request.job_id)), err)]
    pub async fn create(&mut self, request: &FeedbackCreateDBRequest) -> Result<FeedbackDBResponse> {
        let feedback = sqlx::query_as::<_, FeedbackDBResponse>(
            r#"
            INSERT INTO feedback (job_id, author_id, recipient_id, rating, comment)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(request.job_id)
        .bind(request.author_id)
        .bind(request.recipient_id)
        .bind(request.rating)
        .bind(&request.comment)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(feedback)
    }

    #[instrument(skip(self), fields(feedback_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: FeedbackId) -> Result<Option<FeedbackDBResponse>> {
        let feedback = sqlx::query_as::<_, FeedbackDBResponse>("SELECT * FROM feedback WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(feedback)
    }

    #[instrument(skip(self), fields(feedback_id = %abbrev_uuid(&id)), err)]
    pub async fn delete(&mut self, id: FeedbackId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feedback WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &FeedbackFilter) -> Result<Vec<FeedbackDBResponse>> {
        let feedback = sqlx::query_as::<_, FeedbackDBResponse>(&format!(
            "SELECT * FROM feedback WHERE {LIST_FILTER} ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        ))
        .bind(filter.job_id)
        .bind(filter.recipient_id)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(feedback)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &FeedbackFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM feedback WHERE {LIST_FILTER}"))
            .bind(filter.job_id)
            .bind(filter.recipient_id)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::errors::DbError;
    use crate::test_utils::{create_caregiver, create_guardian, create_job, create_patient};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_one_review_per_author_per_job(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "fb_guardian1").await;
        let caregiver = create_caregiver(&mut conn, "fb_caregiver1").await;
        let patient = create_patient(&mut conn, guardian.id).await;
        let job = create_job(&mut conn, guardian.id, patient.id).await;

        let mut repo = Feedback::new(&mut conn);
        let request = FeedbackCreateDBRequest {
            job_id: job.id,
            author_id: guardian.id,
            recipient_id: caregiver.id,
            rating: 5,
            comment: Some("excellent care".to_string()),
        };
        repo.create(&request).await.unwrap();

        let err = repo.create(&request).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_rating_bounds_enforced(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "fb_guardian2").await;
        let caregiver = create_caregiver(&mut conn, "fb_caregiver2").await;
        let patient = create_patient(&mut conn, guardian.id).await;
        let job = create_job(&mut conn, guardian.id, patient.id).await;

        let mut repo = Feedback::new(&mut conn);
        let err = repo
            .create(&FeedbackCreateDBRequest {
                job_id: job.id,
                author_id: guardian.id,
                recipient_id: caregiver.id,
                rating: 6,
                comment: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_by_recipient(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "fb_guardian3").await;
        let caregiver = create_caregiver(&mut conn, "fb_caregiver3").await;
        let patient = create_patient(&mut conn, guardian.id).await;
        let job = create_job(&mut conn, guardian.id, patient.id).await;

        let mut repo = Feedback::new(&mut conn);
        repo.create(&FeedbackCreateDBRequest {
            job_id: job.id,
            author_id: guardian.id,
            recipient_id: caregiver.id,
            rating: 4,
            comment: None,
        })
        .await
        .unwrap();

        let filter = FeedbackFilter {
            recipient_id: Some(caregiver.id),
            limit: 10,
            ..Default::default()
        };
        let listed = repo.list(&filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].rating, 4);
    }
}
