//! Database repository for care agencies.

use crate::types::{abbrev_uuid, AgencyId, UserId};
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::agencies::{AgencyCreateDBRequest, AgencyDBResponse, AgencyUpdateDBRequest},
};
use sqlx::PgConnection;
use tracing::instrument;

/// Filter for listing agencies
#[derive(Debug, Clone, Default)]
pub struct AgencyFilter {
    pub skip: i64,
    pub limit: i64,
    pub verified: Option<bool>,
    pub owner_id: Option<UserId>,
    pub search: Option<String>,
}

pub struct Agencies<'c> {
    db: &'c mut PgConnection,
}

const LIST_FILTER: &str = r#"
    ($1::boolean IS NULL OR verified = $1)
    AND ($2::uuid IS NULL OR owner_id = $2)
    AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%' OR license_number ILIKE '%' || $3 || '%')
"#;

#[async_trait::async_trait]
impl<'c> Repository for Agencies<'c> {
    type CreateRequest = AgencyCreateDBRequest;
    type UpdateRequest = AgencyUpdateDBRequest;
    type Response = AgencyDBResponse;
    type Id = AgencyId;
    type Filter = AgencyFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let agency = sqlx::query_as::<_, AgencyDBResponse>(
            r#"
            INSERT INTO agencies (owner_id, name, license_number)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(request.owner_id)
        .bind(&request.name)
        .bind(&request.license_number)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(agency)
    }

    #[instrument(skip(self), fields(agency_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let agency = sqlx::query_as::<_, AgencyDBResponse>("SELECT * FROM agencies WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(agency)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let agencies = sqlx::query_as::<_, AgencyDBResponse>(&format!(
            "SELECT * FROM agencies WHERE {LIST_FILTER} ORDER BY created_at DESC LIMIT $4 OFFSET $5"
        ))
        .bind(filter.verified)
        .bind(filter.owner_id)
        .bind(&filter.search)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(agencies)
    }

    #[instrument(skip(self, filter), err)]
    async fn count(&mut self, filter: &Self::Filter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM agencies WHERE {LIST_FILTER}"))
            .bind(filter.verified)
            .bind(filter.owner_id)
            .bind(&filter.search)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }

    #[instrument(skip(self), fields(agency_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM agencies WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(agency_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let agency = sqlx::query_as::<_, AgencyDBResponse>(
            r#"
            UPDATE agencies SET
                name = COALESCE($2, name),
                license_number = COALESCE($3, license_number),
                verified = COALESCE($4, verified),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(&request.license_number)
        .bind(request.verified)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(agency)
    }
}

impl<'c> Agencies<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(owner_id = %abbrev_uuid(&owner_id)), err)]
    pub async fn get_by_owner(&mut self, owner_id: UserId) -> Result<Option<AgencyDBResponse>> {
        let agency = sqlx::query_as::<_, AgencyDBResponse>(
            "SELECT * FROM agencies WHERE owner_id = $1 ORDER BY created_at LIMIT 1",
        )
        .bind(owner_id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(agency)
    }
}
