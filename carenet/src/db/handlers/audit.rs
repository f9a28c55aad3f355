//! Repositories for the audit trail and login attempt log.
//!
//! Audit entries are appended inside the same transaction as the operation
//! they record, so a failed append aborts the operation.

use crate::db::{
    errors::Result,
    models::audit::{
        AuditEntryDBRequest, AuditEntryDBResponse, LoginAttemptDBRequest, LoginAttemptDBResponse, SuspiciousSource,
    },
};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

pub struct AuditLog<'c> {
    db: &'c mut PgConnection,
}

impl<'c> AuditLog<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(entity = %request.entity_type, action = %request.action), err)]
    pub async fn append(&mut self, request: &AuditEntryDBRequest) -> Result<AuditEntryDBResponse> {
        let entry = sqlx::query_as::<_, AuditEntryDBResponse>(
            r#"
            INSERT INTO audit_log (entity_type, entity_id, action, description, actor_id, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&request.entity_type)
        .bind(&request.entity_id)
        .bind(&request.action)
        .bind(&request.description)
        .bind(request.actor_id)
        .bind(&request.metadata)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(entry)
    }

    #[instrument(skip(self), err)]
    pub async fn list_for_entity(&mut self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditEntryDBResponse>> {
        let entries = sqlx::query_as::<_, AuditEntryDBResponse>(
            "SELECT * FROM audit_log WHERE entity_type = $1 AND entity_id = $2 ORDER BY created_at",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(entries)
    }

    /// Retention sweep. Returns the number of rows removed.
    #[instrument(skip(self), err)]
    pub async fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM audit_log WHERE created_at < $1")
            .bind(cutoff)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

pub struct LoginAttempts<'c> {
    db: &'c mut PgConnection,
}

impl<'c> LoginAttempts<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(email = %request.email, success = request.success), err)]
    pub async fn record(&mut self, request: &LoginAttemptDBRequest) -> Result<LoginAttemptDBResponse> {
        let attempt = sqlx::query_as::<_, LoginAttemptDBResponse>(
            r#"
            INSERT INTO login_attempts (email, user_id, ip_address, success)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&request.email)
        .bind(request.user_id)
        .bind(&request.ip_address)
        .bind(request.success)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(attempt)
    }

    #[instrument(skip(self, request))]
    pub async fn record_quietly(&mut self, request: &LoginAttemptDBRequest) {
        // Failing to log an attempt should not fail the login itself.
        if let Err(e) = self.record(request).await {
            tracing::warn!(error = %e, "failed to record login attempt");
        }
    }

    /// Retention sweep. Returns the number of rows removed.
    #[instrument(skip(self), err)]
    pub async fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM login_attempts WHERE created_at < $1")
            .bind(cutoff)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected())
    }

    /// IPs with at least `threshold` failed attempts since `since`.
    #[instrument(skip(self), err)]
    pub async fn suspicious_sources(&mut self, since: DateTime<Utc>, threshold: i64) -> Result<Vec<SuspiciousSource>> {
        let sources = sqlx::query_as::<_, SuspiciousSource>(
            r#"
            SELECT ip_address, COUNT(*) AS failures
            FROM login_attempts
            WHERE NOT success AND created_at >= $1
            GROUP BY ip_address
            HAVING COUNT(*) >= $2
            ORDER BY failures DESC
            "#,
        )
        .bind(since)
        .bind(threshold)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(sources)
    }
}
