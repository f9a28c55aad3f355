//! Database models for agencies.

use crate::api::models::agencies::{AgencyCreate, AgencyUpdate};
use crate::types::{AgencyId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for creating an agency
#[derive(Debug, Clone)]
pub struct AgencyCreateDBRequest {
    pub owner_id: UserId,
    pub name: String,
    pub license_number: String,
}

impl AgencyCreateDBRequest {
    pub fn new(api: AgencyCreate, owner_id: UserId) -> Self {
        Self {
            owner_id,
            name: api.name,
            license_number: api.license_number,
        }
    }
}

/// Database request for updating an agency
#[derive(Debug, Clone, Default)]
pub struct AgencyUpdateDBRequest {
    pub name: Option<String>,
    pub license_number: Option<String>,
    pub verified: Option<bool>,
}

impl From<AgencyUpdate> for AgencyUpdateDBRequest {
    fn from(api: AgencyUpdate) -> Self {
        Self {
            name: api.name,
            license_number: api.license_number,
            verified: api.verified,
        }
    }
}

/// Database response for an agency
#[derive(Debug, Clone, FromRow)]
pub struct AgencyDBResponse {
    pub id: AgencyId,
    pub owner_id: UserId,
    pub name: String,
    pub license_number: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
