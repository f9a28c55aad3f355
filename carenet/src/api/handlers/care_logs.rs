//! Care log handlers.
//!
//! Assigned caregivers record activity entries against an active job.
//! Guardians read the logs for their own jobs; staff read everything.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;

use crate::{
    AppState,
    api::models::{
        care_logs::{CareLogCreate, CareLogResponse, ListCareLogsQuery},
        jobs::JobStatus,
        pagination::PaginatedResponse,
    },
    auth::permissions::{RequiresPermission, can_read_all_resources, operation, resource},
    db::{
        handlers::{CareLogs, Jobs, Repository, care_logs::CareLogFilter},
        models::care_logs::CareLogCreateDBRequest,
    },
    errors::{Error, Result},
    types::{CareLogId, JobId, Resource, UserId},
};

fn care_log_not_found(id: CareLogId) -> Error {
    Error::NotFound {
        resource: "Care log".to_string(),
        id: id.to_string(),
    }
}

fn job_not_found(id: JobId) -> Error {
    Error::NotFound {
        resource: "Job".to_string(),
        id: id.to_string(),
    }
}

/// Record a care activity on an active job.
#[utoipa::path(
    post,
    path = "/api/v1/care-logs",
    request_body = CareLogCreate,
    responses(
        (status = 201, description = "Care log created", body = CareLogResponse),
        (status = 400, description = "Caller is not the assigned caregiver"),
        (status = 409, description = "Job is not active"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "care-logs"
)]
#[tracing::instrument(skip_all)]
pub async fn create_care_log(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::CareLogs, operation::CreateOwn>,
    Json(request): Json<CareLogCreate>,
) -> Result<(StatusCode, Json<CareLogResponse>)> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let job = Jobs::new(&mut pool_conn)
        .get_by_id(request.job_id)
        .await?
        .ok_or_else(|| Error::BadRequest {
            message: "Job does not exist".to_string(),
        })?;
    if job.caregiver_id != Some(current_user.id) {
        return Err(Error::BadRequest {
            message: "Only the assigned caregiver can log care activities".to_string(),
        });
    }
    if job.status != JobStatus::Active {
        return Err(Error::Conflict {
            message: "Care can only be logged on active jobs".to_string(),
        });
    }

    let entry = CareLogs::new(&mut pool_conn)
        .create(&CareLogCreateDBRequest {
            job_id: request.job_id,
            caregiver_id: current_user.id,
            activity: request.activity,
            notes: request.notes,
            logged_at: request.logged_at.unwrap_or_else(Utc::now),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(entry.into())))
}

/// List care logs.
///
/// With `job_id`, returns that job's log to its participants. Without it,
/// caregivers get their own entries; staff get everything.
#[utoipa::path(
    get,
    path = "/api/v1/care-logs",
    params(ListCareLogsQuery),
    responses((status = 200, description = "Paginated list of care logs", body = PaginatedResponse<CareLogResponse>)),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "care-logs"
)]
#[tracing::instrument(skip_all)]
pub async fn list_care_logs(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::CareLogs, operation::ReadOwn>,
    Query(query): Query<ListCareLogsQuery>,
) -> Result<Json<PaginatedResponse<CareLogResponse>>> {
    let (skip, limit) = query.pagination.params();
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let read_all = can_read_all_resources(&current_user, Resource::CareLogs);
    let mut caregiver_id: Option<UserId> = None;
    if let Some(job_id) = query.job_id {
        if !read_all {
            let participates = Jobs::new(&mut pool_conn)
                .get_by_id(job_id)
                .await?
                .is_some_and(|job| job.guardian_id == current_user.id || job.caregiver_id == Some(current_user.id));
            if !participates {
                return Err(job_not_found(job_id));
            }
        }
    } else if !read_all {
        caregiver_id = Some(current_user.id);
    }

    let filter = CareLogFilter {
        skip,
        limit,
        job_id: query.job_id,
        caregiver_id,
    };

    let mut repo = CareLogs::new(&mut pool_conn);
    let entries = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        entries.into_iter().map(CareLogResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Get a single care log entry.
#[utoipa::path(
    get,
    path = "/api/v1/care-logs/{care_log_id}",
    params(("care_log_id" = String, Path, description = "Care log ID")),
    responses(
        (status = 200, description = "The care log", body = CareLogResponse),
        (status = 404, description = "Care log not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "care-logs"
)]
#[tracing::instrument(skip_all)]
pub async fn get_care_log(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::CareLogs, operation::ReadOwn>,
    Path(care_log_id): Path<CareLogId>,
) -> Result<Json<CareLogResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let entry = CareLogs::new(&mut pool_conn)
        .get_by_id(care_log_id)
        .await?
        .ok_or_else(|| care_log_not_found(care_log_id))?;

    if entry.caregiver_id != current_user.id && !can_read_all_resources(&current_user, Resource::CareLogs) {
        let is_guardian = Jobs::new(&mut pool_conn)
            .get_by_id(entry.job_id)
            .await?
            .is_some_and(|job| job.guardian_id == current_user.id);
        if !is_guardian {
            return Err(care_log_not_found(care_log_id));
        }
    }

    Ok(Json(entry.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::KycStatus;
    use crate::db::handlers::Users;
    use crate::test_utils::{
        create_caregiver, create_guardian, create_job, create_patient, create_test_config, test_state, token_for,
    };
    use axum::{Router, routing::get};
    use axum_test::TestServer;
    use serde_json::json;
    use sqlx::PgPool;

    fn care_logs_router(state: AppState) -> Router {
        Router::new()
            .route("/care-logs", get(list_care_logs).post(create_care_log))
            .route("/care-logs/{care_log_id}", get(get_care_log))
            .with_state(state)
    }

    struct Fixture {
        guardian: crate::db::models::users::UserDBResponse,
        caregiver: crate::db::models::users::UserDBResponse,
        job_id: uuid::Uuid,
    }

    async fn active_job(pool: &PgPool) -> Fixture {
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        let caregiver = create_caregiver(&mut conn, "caregiver1").await;
        Users::new(&mut conn)
            .set_kyc_status(caregiver.id, KycStatus::Verified)
            .await
            .unwrap();
        let patient = create_patient(&mut conn, guardian.id).await;
        let job = create_job(&mut conn, guardian.id, patient.id).await;
        let mut jobs = Jobs::new(&mut conn);
        jobs.assign_caregiver(job.id, caregiver.id).await.unwrap();
        jobs.set_status(job.id, JobStatus::Active).await.unwrap();
        Fixture {
            guardian,
            caregiver,
            job_id: job.id,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_caregiver_logs_and_guardian_reads(pool: PgPool) {
        let config = create_test_config();
        let fx = active_job(&pool).await;

        let server = TestServer::new(care_logs_router(test_state(pool, config.clone()))).unwrap();

        let response = server
            .post("/care-logs")
            .authorization_bearer(token_for(&fx.caregiver, &config))
            .json(&json!({
                "job_id": fx.job_id,
                "activity": "morning medication",
                "notes": "Blood pressure 130/85 before dosage"
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let entry: CareLogResponse = response.json();
        assert_eq!(entry.caregiver_id, fx.caregiver.id);

        // Guardian reads the job's log
        let response = server
            .get(&format!("/care-logs?job_id={}", fx.job_id))
            .authorization_bearer(token_for(&fx.guardian, &config))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["total_count"], 1);

        server
            .get(&format!("/care-logs/{}", entry.id))
            .authorization_bearer(token_for(&fx.guardian, &config))
            .await
            .assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_only_assigned_caregiver_can_log(pool: PgPool) {
        let config = create_test_config();
        let fx = active_job(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let other = create_caregiver(&mut conn, "caregiver2").await;
        drop(conn);

        let server = TestServer::new(care_logs_router(test_state(pool, config.clone()))).unwrap();

        // Guardians lack the create grant entirely
        server
            .post("/care-logs")
            .authorization_bearer(token_for(&fx.guardian, &config))
            .json(&json!({"job_id": fx.job_id, "activity": "meal"}))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        // Unassigned caregivers are rejected on the ownership check
        server
            .post("/care-logs")
            .authorization_bearer(token_for(&other, &config))
            .json(&json!({"job_id": fx.job_id, "activity": "meal"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_logging_requires_active_job(pool: PgPool) {
        let config = create_test_config();
        let fx = active_job(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        Jobs::new(&mut conn).set_status(fx.job_id, JobStatus::Completed).await.unwrap();
        drop(conn);

        let server = TestServer::new(care_logs_router(test_state(pool, config.clone()))).unwrap();

        server
            .post("/care-logs")
            .authorization_bearer(token_for(&fx.caregiver, &config))
            .json(&json!({"job_id": fx.job_id, "activity": "evening walk"}))
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_logs_hidden_from_unrelated_users(pool: PgPool) {
        let config = create_test_config();
        let fx = active_job(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let outsider = create_guardian(&mut conn, "guardian2").await;
        drop(conn);

        let server = TestServer::new(care_logs_router(test_state(pool, config.clone()))).unwrap();

        let response = server
            .post("/care-logs")
            .authorization_bearer(token_for(&fx.caregiver, &config))
            .json(&json!({"job_id": fx.job_id, "activity": "physiotherapy"}))
            .await;
        let entry: CareLogResponse = response.json();

        server
            .get(&format!("/care-logs?job_id={}", fx.job_id))
            .authorization_bearer(token_for(&outsider, &config))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .get(&format!("/care-logs/{}", entry.id))
            .authorization_bearer(token_for(&outsider, &config))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
