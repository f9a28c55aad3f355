//! Database repository for patients.

use crate::types::{abbrev_uuid, PatientId, UserId};
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::patients::{PatientCreateDBRequest, PatientDBResponse, PatientUpdateDBRequest},
};
use sqlx::PgConnection;
use tracing::instrument;

/// Filter for listing patients
#[derive(Debug, Clone, Default)]
pub struct PatientFilter {
    pub skip: i64,
    pub limit: i64,
    pub guardian_id: Option<UserId>,
    pub search: Option<String>,
}

pub struct Patients<'c> {
    db: &'c mut PgConnection,
}

const LIST_FILTER: &str = r#"
    ($1::uuid IS NULL OR guardian_id = $1)
    AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%')
"#;

#[async_trait::async_trait]
impl<'c> Repository for Patients<'c> {
    type CreateRequest = PatientCreateDBRequest;
    type UpdateRequest = PatientUpdateDBRequest;
    type Response = PatientDBResponse;
    type Id = PatientId;
    type Filter = PatientFilter;

    #[instrument(skip(self, request), fields(guardian_id = %abbrev_uuid(&request.guardian_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let patient = sqlx::query_as::<_, PatientDBResponse>(
            r#"
            INSERT INTO patients (guardian_id, name, date_of_birth, care_notes)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(request.guardian_id)
        .bind(&request.name)
        .bind(request.date_of_birth)
        .bind(&request.care_notes)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(patient)
    }

    #[instrument(skip(self), fields(patient_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let patient = sqlx::query_as::<_, PatientDBResponse>("SELECT * FROM patients WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(patient)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let patients = sqlx::query_as::<_, PatientDBResponse>(&format!(
            "SELECT * FROM patients WHERE {LIST_FILTER} ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        ))
        .bind(filter.guardian_id)
        .bind(&filter.search)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(patients)
    }

    #[instrument(skip(self, filter), err)]
    async fn count(&mut self, filter: &Self::Filter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM patients WHERE {LIST_FILTER}"))
            .bind(filter.guardian_id)
            .bind(&filter.search)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }

    #[instrument(skip(self), fields(patient_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM patients WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(patient_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let patient = sqlx::query_as::<_, PatientDBResponse>(
            r#"
            UPDATE patients SET
                name = COALESCE($2, name),
                date_of_birth = COALESCE($3, date_of_birth),
                care_notes = COALESCE($4, care_notes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(request.date_of_birth)
        .bind(&request.care_notes)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(patient)
    }
}

impl<'c> Patients<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_guardian;
    use chrono::NaiveDate;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_patient(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian_p1").await;

        let mut repo = Patients::new(&mut conn);
        let patient = repo
            .create(&PatientCreateDBRequest {
                guardian_id: guardian.id,
                name: "Abdul Karim".to_string(),
                date_of_birth: NaiveDate::from_ymd_opt(1948, 3, 26),
                care_notes: Some("Needs assistance with mobility".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(patient.guardian_id, guardian.id);
        assert_eq!(patient.name, "Abdul Karim");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_scoped_to_guardian(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let first = create_guardian(&mut conn, "guardian_p2").await;
        let second = create_guardian(&mut conn, "guardian_p3").await;

        let mut repo = Patients::new(&mut conn);
        for (guardian_id, name) in [(first.id, "Patient A"), (second.id, "Patient B")] {
            repo.create(&PatientCreateDBRequest {
                guardian_id,
                name: name.to_string(),
                date_of_birth: None,
                care_notes: None,
            })
            .await
            .unwrap();
        }

        let filter = PatientFilter {
            guardian_id: Some(first.id),
            limit: 10,
            ..Default::default()
        };
        let listed = repo.list(&filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Patient A");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_missing_patient(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Patients::new(&mut conn);

        let err = repo
            .update(uuid::Uuid::new_v4(), &PatientUpdateDBRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }
}
