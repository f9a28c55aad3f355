//! API request/response models for care agencies.

use super::pagination::Pagination;
use crate::db::models::agencies::AgencyDBResponse;
use crate::types::{AgencyId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgencyCreate {
    pub name: String,
    pub license_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgencyUpdate {
    pub name: Option<String>,
    pub license_number: Option<String>,
    /// Only applied when the caller may update all agencies (moderator/admin)
    pub verified: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgencyResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: AgencyId,
    #[schema(value_type = String, format = "uuid")]
    pub owner_id: UserId,
    pub name: String,
    pub license_number: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Query parameters for listing agencies
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListAgenciesQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Filter by verification status
    pub verified: Option<bool>,

    /// Search by agency name (case-insensitive substring match)
    pub search: Option<String>,
}

impl From<AgencyDBResponse> for AgencyResponse {
    fn from(db: AgencyDBResponse) -> Self {
        Self {
            id: db.id,
            owner_id: db.owner_id,
            name: db.name,
            license_number: db.license_number,
            verified: db.verified,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
