//! Care agency handlers.
//!
//! The agency directory is readable by any authenticated user so guardians
//! can browse providers. Mutation is restricted to the owner, with the
//! `verified` flag reserved for staff.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        agencies::{AgencyCreate, AgencyResponse, AgencyUpdate, ListAgenciesQuery},
        pagination::PaginatedResponse,
        users::CurrentUser,
    },
    auth::permissions::{RequiresPermission, has_permission, operation, permission_denied, resource},
    db::{
        errors::DbError,
        handlers::{Agencies, Repository, agencies::AgencyFilter},
        models::agencies::{AgencyCreateDBRequest, AgencyUpdateDBRequest},
    },
    errors::{Error, Result},
    types::{AgencyId, Operation, Resource},
};

fn agency_not_found(id: AgencyId) -> Error {
    Error::NotFound {
        resource: "Agency".to_string(),
        id: id.to_string(),
    }
}

/// Register an agency owned by the caller.
#[utoipa::path(
    post,
    path = "/api/v1/agencies",
    request_body = AgencyCreate,
    responses(
        (status = 201, description = "Agency created", body = AgencyResponse),
        (status = 409, description = "License number already registered"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "agencies"
)]
#[tracing::instrument(skip_all)]
pub async fn create_agency(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Agencies, operation::CreateOwn>,
    Json(request): Json<AgencyCreate>,
) -> Result<(StatusCode, Json<AgencyResponse>)> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let agency = Agencies::new(&mut pool_conn)
        .create(&AgencyCreateDBRequest::new(request, current_user.id))
        .await?;

    Ok((StatusCode::CREATED, Json(agency.into())))
}

/// List agencies. Any authenticated user can browse the directory.
#[utoipa::path(
    get,
    path = "/api/v1/agencies",
    params(ListAgenciesQuery),
    responses((status = 200, description = "Paginated list of agencies", body = PaginatedResponse<AgencyResponse>)),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "agencies"
)]
#[tracing::instrument(skip_all)]
pub async fn list_agencies(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<ListAgenciesQuery>,
) -> Result<Json<PaginatedResponse<AgencyResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = AgencyFilter {
        skip,
        limit,
        verified: query.verified,
        owner_id: None,
        search: query.search,
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Agencies::new(&mut pool_conn);
    let agencies = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        agencies.into_iter().map(AgencyResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Get a single agency.
#[utoipa::path(
    get,
    path = "/api/v1/agencies/{agency_id}",
    params(("agency_id" = String, Path, description = "Agency ID")),
    responses(
        (status = 200, description = "The agency", body = AgencyResponse),
        (status = 404, description = "Agency not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "agencies"
)]
#[tracing::instrument(skip_all)]
pub async fn get_agency(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(agency_id): Path<AgencyId>,
) -> Result<Json<AgencyResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let agency = Agencies::new(&mut pool_conn)
        .get_by_id(agency_id)
        .await?
        .ok_or_else(|| agency_not_found(agency_id))?;

    Ok(Json(agency.into()))
}

/// Update an agency.
///
/// Owners can edit their own listing; the `verified` flag is only applied
/// for callers with full update rights.
#[utoipa::path(
    put,
    path = "/api/v1/agencies/{agency_id}",
    params(("agency_id" = String, Path, description = "Agency ID")),
    request_body = AgencyUpdate,
    responses(
        (status = 200, description = "Updated agency", body = AgencyResponse),
        (status = 403, description = "Caller cannot update this agency"),
        (status = 404, description = "Agency not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "agencies"
)]
#[tracing::instrument(skip_all)]
pub async fn update_agency(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(agency_id): Path<AgencyId>,
    Json(mut request): Json<AgencyUpdate>,
) -> Result<Json<AgencyResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Agencies::new(&mut pool_conn);

    let agency = repo.get_by_id(agency_id).await?.ok_or_else(|| agency_not_found(agency_id))?;

    let update_all = has_permission(&current_user, Resource::Agencies, Operation::UpdateAll);
    if agency.owner_id == current_user.id {
        if !has_permission(&current_user, Resource::Agencies, Operation::UpdateOwn) {
            return Err(permission_denied(Resource::Agencies, Operation::UpdateOwn));
        }
    } else if !update_all {
        return Err(permission_denied(Resource::Agencies, Operation::UpdateAll));
    }

    // Verification is a staff decision
    if !update_all {
        request.verified = None;
    }

    let agency = repo
        .update(agency_id, &AgencyUpdateDBRequest::from(request))
        .await
        .map_err(|e| match e {
            DbError::NotFound => agency_not_found(agency_id),
            other => other.into(),
        })?;

    Ok(Json(agency.into()))
}

/// Delete an agency.
#[utoipa::path(
    delete,
    path = "/api/v1/agencies/{agency_id}",
    params(("agency_id" = String, Path, description = "Agency ID")),
    responses(
        (status = 204, description = "Agency deleted"),
        (status = 403, description = "Caller cannot delete this agency"),
        (status = 404, description = "Agency not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "agencies"
)]
#[tracing::instrument(skip_all)]
pub async fn delete_agency(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(agency_id): Path<AgencyId>,
) -> Result<StatusCode> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Agencies::new(&mut pool_conn);

    let agency = repo.get_by_id(agency_id).await?.ok_or_else(|| agency_not_found(agency_id))?;

    if agency.owner_id == current_user.id {
        if !has_permission(&current_user, Resource::Agencies, Operation::DeleteOwn) {
            return Err(permission_denied(Resource::Agencies, Operation::DeleteOwn));
        }
    } else if !has_permission(&current_user, Resource::Agencies, Operation::DeleteAll) {
        return Err(permission_denied(Resource::Agencies, Operation::DeleteAll));
    }

    repo.delete(agency_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_agency_owner, create_guardian, create_moderator, create_test_config, test_state, token_for};
    use axum::{Router, routing::get};
    use axum_test::TestServer;
    use serde_json::json;
    use sqlx::PgPool;

    fn agencies_router(state: AppState) -> Router {
        Router::new()
            .route("/agencies", get(list_agencies).post(create_agency))
            .route(
                "/agencies/{agency_id}",
                get(get_agency).put(update_agency).delete(delete_agency),
            )
            .with_state(state)
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_browse_agency(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let owner = create_agency_owner(&mut conn, "agency1").await;
        let guardian = create_guardian(&mut conn, "guardian1").await;
        drop(conn);

        let server = TestServer::new(agencies_router(test_state(pool, config.clone()))).unwrap();

        let response = server
            .post("/agencies")
            .authorization_bearer(token_for(&owner, &config))
            .json(&json!({"name": "Dhaka Care Services", "license_number": "DHK-2024-001"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let agency: AgencyResponse = response.json();
        assert_eq!(agency.owner_id, owner.id);
        assert!(!agency.verified);

        // Guardians can browse the directory
        let response = server
            .get("/agencies")
            .authorization_bearer(token_for(&guardian, &config))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["total_count"], 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_guardian_cannot_create_agency(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        drop(conn);

        let server = TestServer::new(agencies_router(test_state(pool, config.clone()))).unwrap();

        server
            .post("/agencies")
            .authorization_bearer(token_for(&guardian, &config))
            .json(&json!({"name": "Fake Agency", "license_number": "X-1"}))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_owner_cannot_self_verify(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let owner = create_agency_owner(&mut conn, "agency1").await;
        let moderator = create_moderator(&mut conn, "mod1").await;
        drop(conn);

        let server = TestServer::new(agencies_router(test_state(pool, config.clone()))).unwrap();

        let response = server
            .post("/agencies")
            .authorization_bearer(token_for(&owner, &config))
            .json(&json!({"name": "Chittagong Care", "license_number": "CTG-42"}))
            .await;
        let agency: AgencyResponse = response.json();

        // Owner tries to flip verified, flag is ignored
        let response = server
            .put(&format!("/agencies/{}", agency.id))
            .authorization_bearer(token_for(&owner, &config))
            .json(&json!({"verified": true}))
            .await;
        response.assert_status_ok();
        let updated: AgencyResponse = response.json();
        assert!(!updated.verified);

        // Moderator can verify
        let response = server
            .put(&format!("/agencies/{}", agency.id))
            .authorization_bearer(token_for(&moderator, &config))
            .json(&json!({"verified": true}))
            .await;
        response.assert_status_ok();
        let updated: AgencyResponse = response.json();
        assert!(updated.verified);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_non_owner_cannot_update(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let owner = create_agency_owner(&mut conn, "agency1").await;
        let other = create_agency_owner(&mut conn, "agency2").await;
        drop(conn);

        let server = TestServer::new(agencies_router(test_state(pool, config.clone()))).unwrap();

        let response = server
            .post("/agencies")
            .authorization_bearer(token_for(&owner, &config))
            .json(&json!({"name": "Sylhet Care", "license_number": "SYL-7"}))
            .await;
        let agency: AgencyResponse = response.json();

        server
            .put(&format!("/agencies/{}", agency.id))
            .authorization_bearer(token_for(&other, &config))
            .json(&json!({"name": "Hijacked"}))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}
