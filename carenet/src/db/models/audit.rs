//! Database models for the audit trail and login attempt log.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for appending an audit entry
#[derive(Debug, Clone)]
pub struct AuditEntryDBRequest {
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub description: String,
    pub actor_id: Option<UserId>,
    pub metadata: Option<serde_json::Value>,
}

impl AuditEntryDBRequest {
    pub fn new(
        entity_type: &str,
        entity_id: impl ToString,
        action: &str,
        description: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action: action.to_string(),
            description: description.into(),
            actor_id: None,
            metadata: None,
        }
    }

    pub fn actor(mut self, actor_id: UserId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Database response for an audit entry
#[derive(Debug, Clone, FromRow)]
pub struct AuditEntryDBResponse {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub description: String,
    pub actor_id: Option<UserId>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Database request for recording a login attempt
#[derive(Debug, Clone)]
pub struct LoginAttemptDBRequest {
    pub email: String,
    pub user_id: Option<UserId>,
    pub ip_address: String,
    pub success: bool,
}

/// Database response for a login attempt
#[derive(Debug, Clone, FromRow)]
pub struct LoginAttemptDBResponse {
    pub id: i64,
    pub email: String,
    pub user_id: Option<UserId>,
    pub ip_address: String,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

/// A source address with an anomalous number of failed logins
#[derive(Debug, Clone, FromRow)]
pub struct SuspiciousSource {
    pub ip_address: String,
    pub failures: i64,
}
