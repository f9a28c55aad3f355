//! User management handlers.
//!
//! `/users/current` and `/users/{user_id}` share handlers via
//! [`UserIdOrCurrent`]. Staff accounts (admin, moderator) manage other users;
//! everyone else is limited to their own account.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        pagination::PaginatedResponse,
        users::{CurrentUser, KycStatusUpdate, ListUsersQuery, UserResponse, UserUpdate},
    },
    auth::permissions::{
        RequiresPermission, can_read_all_resources, has_permission, operation, permission_denied, resource,
    },
    db::{
        errors::DbError,
        handlers::{Repository, Users, users::UserFilter},
        models::users::UserUpdateDBRequest,
    },
    errors::{Error, Result},
    types::{Operation, Resource, UserId, UserIdOrCurrent},
};

fn resolve_user_id(id: &UserIdOrCurrent, user: &CurrentUser) -> UserId {
    match id {
        UserIdOrCurrent::Current(_) => user.id,
        UserIdOrCurrent::Id(id) => *id,
    }
}

fn user_not_found(id: UserId) -> Error {
    Error::NotFound {
        resource: "User".to_string(),
        id: id.to_string(),
    }
}

/// List users with optional role, KYC and search filters. Staff only.
#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Paginated list of users", body = PaginatedResponse<UserResponse>),
        (status = 403, description = "Caller cannot list users"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "users"
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    _current_user: RequiresPermission<resource::Users, operation::ReadAll>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<PaginatedResponse<UserResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = UserFilter {
        skip,
        limit,
        role: query.role,
        kyc_status: query.kyc_status,
        search: query.search,
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut pool_conn);
    let users = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        users.into_iter().map(UserResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Get a user by ID, or the caller via `/users/current`.
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}",
    params(("user_id" = String, Path, description = "User ID or 'current'")),
    responses(
        (status = 200, description = "The user", body = UserResponse),
        (status = 404, description = "User not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "users"
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(user_id): Path<UserIdOrCurrent>,
) -> Result<Json<UserResponse>> {
    let target = resolve_user_id(&user_id, &current_user);
    if target != current_user.id && !can_read_all_resources(&current_user, Resource::Users) {
        return Err(permission_denied(Resource::Users, Operation::ReadAll));
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut pool_conn)
        .get_by_id(target)
        .await?
        .ok_or_else(|| user_not_found(target))?;

    Ok(Json(user.into()))
}

/// Update a user's profile.
///
/// Users can update their own profile; staff with full update rights can
/// update anyone and change roles.
#[utoipa::path(
    put,
    path = "/api/v1/users/{user_id}",
    params(("user_id" = String, Path, description = "User ID or 'current'")),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 403, description = "Caller cannot update this user"),
        (status = 404, description = "User not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "users"
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(user_id): Path<UserIdOrCurrent>,
    Json(mut request): Json<UserUpdate>,
) -> Result<Json<UserResponse>> {
    let target = resolve_user_id(&user_id, &current_user);
    let update_all = has_permission(&current_user, Resource::Users, Operation::UpdateAll);

    if target == current_user.id {
        if !has_permission(&current_user, Resource::Users, Operation::UpdateOwn) {
            return Err(permission_denied(Resource::Users, Operation::UpdateOwn));
        }
    } else if !update_all {
        return Err(permission_denied(Resource::Users, Operation::UpdateAll));
    }

    // Role changes are a staff concern; drop them for self-service updates
    if !update_all {
        request.roles = None;
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut pool_conn)
        .update(target, &UserUpdateDBRequest::new(request))
        .await
        .map_err(|e| match e {
            DbError::NotFound => user_not_found(target),
            other => other.into(),
        })?;

    Ok(Json(user.into()))
}

/// Delete a user account.
#[utoipa::path(
    delete,
    path = "/api/v1/users/{user_id}",
    params(("user_id" = String, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Caller cannot delete this user"),
        (status = 404, description = "User not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "users"
)]
#[tracing::instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(user_id): Path<UserId>,
) -> Result<StatusCode> {
    if user_id == current_user.id {
        if !has_permission(&current_user, Resource::Users, Operation::DeleteOwn) {
            return Err(permission_denied(Resource::Users, Operation::DeleteOwn));
        }
    } else if !has_permission(&current_user, Resource::Users, Operation::DeleteAll) {
        return Err(permission_denied(Resource::Users, Operation::DeleteAll));
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let deleted = Users::new(&mut pool_conn).delete(user_id).await?;
    if !deleted {
        return Err(user_not_found(user_id));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Move a user's KYC status. Moderator/admin only.
#[utoipa::path(
    patch,
    path = "/api/v1/users/{user_id}/kyc",
    params(("user_id" = String, Path, description = "User ID")),
    request_body = KycStatusUpdate,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 403, description = "Caller cannot change KYC status"),
        (status = 404, description = "User not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "users"
)]
#[tracing::instrument(skip_all)]
pub async fn set_kyc_status(
    State(state): State<AppState>,
    _current_user: RequiresPermission<resource::Users, operation::UpdateAll>,
    Path(user_id): Path<UserId>,
    Json(request): Json<KycStatusUpdate>,
) -> Result<Json<UserResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut pool_conn)
        .set_kyc_status(user_id, request.kyc_status)
        .await
        .map_err(|e| match e {
            DbError::NotFound => user_not_found(user_id),
            other => other.into(),
        })?;

    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::{KycStatus, Role};
    use crate::test_utils::{create_guardian, create_moderator, create_test_config, test_state, token_for};
    use axum::{
        Router,
        routing::{get, patch},
    };
    use axum_test::TestServer;
    use serde_json::json;
    use sqlx::PgPool;

    fn users_router(state: AppState) -> Router {
        Router::new()
            .route("/users", get(list_users))
            .route("/users/{user_id}", get(get_user).put(update_user).delete(delete_user))
            .route("/users/{user_id}/kyc", patch(set_kyc_status))
            .with_state(state)
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_users_staff_only(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        let moderator = create_moderator(&mut conn, "mod1").await;
        drop(conn);

        let server = TestServer::new(users_router(test_state(pool, config.clone()))).unwrap();

        let response = server
            .get("/users")
            .authorization_bearer(token_for(&moderator, &config))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["total_count"], 2);

        server
            .get("/users")
            .authorization_bearer(token_for(&guardian, &config))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_current_user(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        drop(conn);

        let server = TestServer::new(users_router(test_state(pool, config.clone()))).unwrap();

        let response = server
            .get("/users/current")
            .authorization_bearer(token_for(&guardian, &config))
            .await;
        response.assert_status_ok();
        let body: UserResponse = response.json();
        assert_eq!(body.id, guardian.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_guardian_cannot_read_other_users(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        let other = create_guardian(&mut conn, "guardian2").await;
        drop(conn);

        let server = TestServer::new(users_router(test_state(pool, config.clone()))).unwrap();

        server
            .get(&format!("/users/{}", other.id))
            .authorization_bearer(token_for(&guardian, &config))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_self_update_cannot_escalate_roles(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        drop(conn);

        let server = TestServer::new(users_router(test_state(pool, config.clone()))).unwrap();

        let response = server
            .put("/users/current")
            .authorization_bearer(token_for(&guardian, &config))
            .json(&json!({"display_name": "New Name", "roles": ["ADMIN"]}))
            .await;
        response.assert_status_ok();
        let body: UserResponse = response.json();
        assert_eq!(body.display_name.as_deref(), Some("New Name"));
        assert_eq!(body.roles, vec![Role::Guardian]);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_moderator_sets_kyc_status(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        let moderator = create_moderator(&mut conn, "mod1").await;
        drop(conn);

        let server = TestServer::new(users_router(test_state(pool, config.clone()))).unwrap();

        // Guardians cannot verify themselves
        server
            .patch(&format!("/users/{}/kyc", guardian.id))
            .authorization_bearer(token_for(&guardian, &config))
            .json(&json!({"kyc_status": "VERIFIED"}))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let response = server
            .patch(&format!("/users/{}/kyc", guardian.id))
            .authorization_bearer(token_for(&moderator, &config))
            .json(&json!({"kyc_status": "VERIFIED"}))
            .await;
        response.assert_status_ok();
        let body: UserResponse = response.json();
        assert_eq!(body.kyc_status, KycStatus::Verified);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_moderator_cannot_delete_users(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        let moderator = create_moderator(&mut conn, "mod1").await;
        drop(conn);

        let server = TestServer::new(users_router(test_state(pool, config.clone()))).unwrap();

        server
            .delete(&format!("/users/{}", guardian.id))
            .authorization_bearer(token_for(&moderator, &config))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        // Self-deletion is allowed
        server
            .delete(&format!("/users/{}", guardian.id))
            .authorization_bearer(token_for(&guardian, &config))
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }
}
