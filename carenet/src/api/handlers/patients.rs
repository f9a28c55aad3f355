//! Patient profile handlers.
//!
//! Patients are care recipients managed by their guardian. All access is
//! guardian-scoped unless the caller has staff read rights.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        pagination::PaginatedResponse,
        patients::{ListPatientsQuery, PatientCreate, PatientResponse, PatientUpdate},
    },
    auth::permissions::{RequiresPermission, can_read_all_resources, has_permission, operation, resource},
    db::{
        errors::DbError,
        handlers::{Patients, Repository, patients::PatientFilter},
        models::patients::{PatientCreateDBRequest, PatientUpdateDBRequest},
    },
    errors::{Error, Result},
    types::{Operation, PatientId, Resource},
};

fn patient_not_found(id: PatientId) -> Error {
    Error::NotFound {
        resource: "Patient".to_string(),
        id: id.to_string(),
    }
}

/// Add a patient under the caller's guardianship.
#[utoipa::path(
    post,
    path = "/api/v1/patients",
    request_body = PatientCreate,
    responses((status = 201, description = "Patient created", body = PatientResponse)),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "patients"
)]
#[tracing::instrument(skip_all)]
pub async fn create_patient(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Patients, operation::CreateOwn>,
    Json(request): Json<PatientCreate>,
) -> Result<(StatusCode, Json<PatientResponse>)> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let patient = Patients::new(&mut pool_conn)
        .create(&PatientCreateDBRequest::new(request, current_user.id))
        .await?;

    Ok((StatusCode::CREATED, Json(patient.into())))
}

/// List patients. Guardians see only their own; staff see everyone.
#[utoipa::path(
    get,
    path = "/api/v1/patients",
    params(ListPatientsQuery),
    responses((status = 200, description = "Paginated list of patients", body = PaginatedResponse<PatientResponse>)),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "patients"
)]
#[tracing::instrument(skip_all)]
pub async fn list_patients(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Patients, operation::ReadOwn>,
    Query(query): Query<ListPatientsQuery>,
) -> Result<Json<PaginatedResponse<PatientResponse>>> {
    let (skip, limit) = query.pagination.params();
    let guardian_id = if can_read_all_resources(&current_user, Resource::Patients) {
        None
    } else {
        Some(current_user.id)
    };
    let filter = PatientFilter {
        skip,
        limit,
        guardian_id,
        search: query.search,
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Patients::new(&mut pool_conn);
    let patients = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        patients.into_iter().map(PatientResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Get a single patient.
#[utoipa::path(
    get,
    path = "/api/v1/patients/{patient_id}",
    params(("patient_id" = String, Path, description = "Patient ID")),
    responses(
        (status = 200, description = "The patient", body = PatientResponse),
        (status = 404, description = "Patient not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "patients"
)]
#[tracing::instrument(skip_all)]
pub async fn get_patient(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Patients, operation::ReadOwn>,
    Path(patient_id): Path<PatientId>,
) -> Result<Json<PatientResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let patient = Patients::new(&mut pool_conn)
        .get_by_id(patient_id)
        .await?
        .ok_or_else(|| patient_not_found(patient_id))?;

    if patient.guardian_id != current_user.id && !can_read_all_resources(&current_user, Resource::Patients) {
        // Hide existence from unrelated users
        return Err(patient_not_found(patient_id));
    }

    Ok(Json(patient.into()))
}

/// Update a patient's profile.
#[utoipa::path(
    put,
    path = "/api/v1/patients/{patient_id}",
    params(("patient_id" = String, Path, description = "Patient ID")),
    request_body = PatientUpdate,
    responses(
        (status = 200, description = "Updated patient", body = PatientResponse),
        (status = 404, description = "Patient not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "patients"
)]
#[tracing::instrument(skip_all)]
pub async fn update_patient(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Patients, operation::UpdateOwn>,
    Path(patient_id): Path<PatientId>,
    Json(request): Json<PatientUpdate>,
) -> Result<Json<PatientResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Patients::new(&mut pool_conn);

    let patient = repo.get_by_id(patient_id).await?.ok_or_else(|| patient_not_found(patient_id))?;
    if patient.guardian_id != current_user.id && !has_permission(&current_user, Resource::Patients, Operation::UpdateAll)
    {
        return Err(patient_not_found(patient_id));
    }

    let patient = repo
        .update(patient_id, &PatientUpdateDBRequest::from(request))
        .await
        .map_err(|e| match e {
            DbError::NotFound => patient_not_found(patient_id),
            other => other.into(),
        })?;

    Ok(Json(patient.into()))
}

/// Remove a patient.
#[utoipa::path(
    delete,
    path = "/api/v1/patients/{patient_id}",
    params(("patient_id" = String, Path, description = "Patient ID")),
    responses(
        (status = 204, description = "Patient deleted"),
        (status = 404, description = "Patient not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "patients"
)]
#[tracing::instrument(skip_all)]
pub async fn delete_patient(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Patients, operation::DeleteOwn>,
    Path(patient_id): Path<PatientId>,
) -> Result<StatusCode> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Patients::new(&mut pool_conn);

    let patient = repo.get_by_id(patient_id).await?.ok_or_else(|| patient_not_found(patient_id))?;
    if patient.guardian_id != current_user.id && !has_permission(&current_user, Resource::Patients, Operation::DeleteAll)
    {
        return Err(patient_not_found(patient_id));
    }

    repo.delete(patient_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_guardian, create_moderator, create_test_config, test_state, token_for};
    use axum::{Router, routing::get};
    use axum_test::TestServer;
    use serde_json::json;
    use sqlx::PgPool;

    fn patients_router(state: AppState) -> Router {
        Router::new()
            .route("/patients", get(list_patients).post(create_patient))
            .route(
                "/patients/{patient_id}",
                get(get_patient).put(update_patient).delete(delete_patient),
            )
            .with_state(state)
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_patient_crud(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        drop(conn);

        let server = TestServer::new(patients_router(test_state(pool, config.clone()))).unwrap();
        let token = token_for(&guardian, &config);

        let response = server
            .post("/patients")
            .authorization_bearer(&token)
            .json(&json!({"name": "Rahima Begum", "date_of_birth": "1948-03-12", "care_notes": "Diabetic, needs insulin twice daily"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let patient: PatientResponse = response.json();
        assert_eq!(patient.guardian_id, guardian.id);

        let response = server
            .put(&format!("/patients/{}", patient.id))
            .authorization_bearer(&token)
            .json(&json!({"care_notes": "Diabetic, insulin twice daily, low-sodium diet"}))
            .await;
        response.assert_status_ok();

        server
            .delete(&format!("/patients/{}", patient.id))
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        server
            .get(&format!("/patients/{}", patient.id))
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_patients_are_guardian_scoped(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        let other = create_guardian(&mut conn, "guardian2").await;
        let moderator = create_moderator(&mut conn, "mod1").await;
        drop(conn);

        let server = TestServer::new(patients_router(test_state(pool, config.clone()))).unwrap();

        let response = server
            .post("/patients")
            .authorization_bearer(token_for(&guardian, &config))
            .json(&json!({"name": "Abdul Karim"}))
            .await;
        let patient: PatientResponse = response.json();

        // Another guardian sees neither the patient nor its existence
        server
            .get(&format!("/patients/{}", patient.id))
            .authorization_bearer(token_for(&other, &config))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let response = server
            .get("/patients")
            .authorization_bearer(token_for(&other, &config))
            .await;
        let body: serde_json::Value = response.json();
        assert_eq!(body["total_count"], 0);

        // Staff read access is unscoped
        server
            .get(&format!("/patients/{}", patient.id))
            .authorization_bearer(token_for(&moderator, &config))
            .await
            .assert_status_ok();
    }
}
