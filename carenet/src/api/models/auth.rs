//! API models for registration, login and password change.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::users::{Role, UserResponse};

/// Self-registration request.
///
/// Only marketplace roles can be requested at registration; admin and
/// moderator accounts are provisioned by an admin.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub display_name: Option<String>,
    /// Requested role: GUARDIAN, CAREGIVER, or AGENCY
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    /// JWT session token; also set as an HTTP-only cookie
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
}
