//! Care job handlers.
//!
//! A job is posted by a guardian for one of their patients, optionally
//! through an agency, and later assigned to a caregiver. Listing is scoped
//! to the caller's side of the marketplace unless they hold staff read
//! rights.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        jobs::{AssignCaregiverRequest, JobCreate, JobResponse, JobStatus, JobStatusUpdate, JobUpdate, ListJobsQuery},
        pagination::PaginatedResponse,
        users::{CurrentUser, KycStatus, Role},
    },
    auth::permissions::{RequiresPermission, can_read_all_resources, has_permission, operation, permission_denied, resource},
    db::{
        errors::DbError,
        handlers::{Agencies, Jobs, Patients, Repository, Users, jobs::JobFilter},
        models::jobs::{JobCreateDBRequest, JobDBResponse, JobUpdateDBRequest},
    },
    errors::{Error, Result},
    types::{JobId, Operation, Resource},
};

fn job_not_found(id: JobId) -> Error {
    Error::NotFound {
        resource: "Job".to_string(),
        id: id.to_string(),
    }
}

/// Is the caller a direct participant (guardian or assigned caregiver)?
fn is_participant(job: &JobDBResponse, user: &CurrentUser) -> bool {
    job.guardian_id == user.id || job.caregiver_id == Some(user.id)
}

/// Post a care job for one of the caller's patients.
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    request_body = JobCreate,
    responses(
        (status = 201, description = "Job created", body = JobResponse),
        (status = 400, description = "Invalid patient or agency reference"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "jobs"
)]
#[tracing::instrument(skip_all)]
pub async fn create_job(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Jobs, operation::CreateOwn>,
    Json(request): Json<JobCreate>,
) -> Result<(StatusCode, Json<JobResponse>)> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let patient = Patients::new(&mut pool_conn)
        .get_by_id(request.patient_id)
        .await?
        .ok_or_else(|| Error::BadRequest {
            message: "Patient does not exist".to_string(),
        })?;
    if patient.guardian_id != current_user.id {
        return Err(Error::BadRequest {
            message: "Patient is not under your guardianship".to_string(),
        });
    }

    let job = Jobs::new(&mut pool_conn)
        .create(&JobCreateDBRequest {
            guardian_id: current_user.id,
            patient_id: request.patient_id,
            agency_id: request.agency_id,
            description: request.description,
            daily_rate: request.daily_rate,
            currency: request.currency.unwrap_or_else(|| state.config.default_currency.clone()),
            start_date: request.start_date,
            end_date: request.end_date,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(job.into())))
}

/// List jobs visible to the caller.
///
/// Staff see everything; guardians see jobs they posted, caregivers jobs
/// they are assigned to, and agency owners jobs routed to their agency. For
/// callers holding several roles the first matching scope above applies.
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    params(ListJobsQuery),
    responses((status = 200, description = "Paginated list of jobs", body = PaginatedResponse<JobResponse>)),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "jobs"
)]
#[tracing::instrument(skip_all)]
pub async fn list_jobs(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Jobs, operation::ReadOwn>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<PaginatedResponse<JobResponse>>> {
    let (skip, limit) = query.pagination.params();
    let mut filter = JobFilter {
        skip,
        limit,
        status: query.status,
        ..Default::default()
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    if !can_read_all_resources(&current_user, Resource::Jobs) {
        if current_user.roles.contains(&Role::Guardian) {
            filter.guardian_id = Some(current_user.id);
        } else if current_user.roles.contains(&Role::Caregiver) {
            filter.caregiver_id = Some(current_user.id);
        } else if current_user.roles.contains(&Role::Agency) {
            let agency = Agencies::new(&mut pool_conn).get_by_owner(current_user.id).await?;
            match agency {
                Some(agency) => filter.agency_id = Some(agency.id),
                // No agency registered yet means nothing to list
                None => return Ok(Json(PaginatedResponse::new(vec![], 0, skip, limit))),
            }
        } else {
            return Err(permission_denied(Resource::Jobs, Operation::ReadOwn));
        }
    }

    let mut repo = Jobs::new(&mut pool_conn);
    let jobs = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        jobs.into_iter().map(JobResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Get a single job.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{job_id}",
    params(("job_id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "The job", body = JobResponse),
        (status = 404, description = "Job not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "jobs"
)]
#[tracing::instrument(skip_all)]
pub async fn get_job(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Jobs, operation::ReadOwn>,
    Path(job_id): Path<JobId>,
) -> Result<Json<JobResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let job = Jobs::new(&mut pool_conn)
        .get_by_id(job_id)
        .await?
        .ok_or_else(|| job_not_found(job_id))?;

    if !is_participant(&job, &current_user) && !can_read_all_resources(&current_user, Resource::Jobs) {
        let agency_owned = match job.agency_id {
            Some(agency_id) => Agencies::new(&mut pool_conn)
                .get_by_id(agency_id)
                .await?
                .is_some_and(|a| a.owner_id == current_user.id),
            None => false,
        };
        if !agency_owned {
            return Err(job_not_found(job_id));
        }
    }

    Ok(Json(job.into()))
}

/// Update a job's details. Posting guardian or staff only.
#[utoipa::path(
    put,
    path = "/api/v1/jobs/{job_id}",
    params(("job_id" = String, Path, description = "Job ID")),
    request_body = JobUpdate,
    responses(
        (status = 200, description = "Updated job", body = JobResponse),
        (status = 404, description = "Job not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "jobs"
)]
#[tracing::instrument(skip_all)]
pub async fn update_job(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Jobs, operation::UpdateOwn>,
    Path(job_id): Path<JobId>,
    Json(request): Json<JobUpdate>,
) -> Result<Json<JobResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Jobs::new(&mut pool_conn);

    let job = repo.get_by_id(job_id).await?.ok_or_else(|| job_not_found(job_id))?;
    if job.guardian_id != current_user.id && !has_permission(&current_user, Resource::Jobs, Operation::UpdateAll) {
        return Err(job_not_found(job_id));
    }

    let job = repo
        .update(job_id, &JobUpdateDBRequest::from(request))
        .await
        .map_err(|e| match e {
            DbError::NotFound => job_not_found(job_id),
            other => other.into(),
        })?;

    Ok(Json(job.into()))
}

/// Assign a caregiver to a pending job.
///
/// The caregiver must hold the caregiver role and have passed KYC
/// verification.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{job_id}/caregiver",
    params(("job_id" = String, Path, description = "Job ID")),
    request_body = AssignCaregiverRequest,
    responses(
        (status = 200, description = "Caregiver assigned", body = JobResponse),
        (status = 400, description = "Caregiver unsuitable for assignment"),
        (status = 409, description = "Job is not pending"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "jobs"
)]
#[tracing::instrument(skip_all)]
pub async fn assign_caregiver(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Jobs, operation::UpdateOwn>,
    Path(job_id): Path<JobId>,
    Json(request): Json<AssignCaregiverRequest>,
) -> Result<Json<JobResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let job = Jobs::new(&mut pool_conn)
        .get_by_id(job_id)
        .await?
        .ok_or_else(|| job_not_found(job_id))?;

    let agency_owned = match job.agency_id {
        Some(agency_id) => Agencies::new(&mut pool_conn)
            .get_by_id(agency_id)
            .await?
            .is_some_and(|a| a.owner_id == current_user.id),
        None => false,
    };
    if job.guardian_id != current_user.id
        && !agency_owned
        && !has_permission(&current_user, Resource::Jobs, Operation::UpdateAll)
    {
        return Err(job_not_found(job_id));
    }

    let caregiver = Users::new(&mut pool_conn)
        .get_by_id(request.caregiver_id)
        .await?
        .ok_or_else(|| Error::BadRequest {
            message: "Caregiver does not exist".to_string(),
        })?;
    if !caregiver.roles.contains(&Role::Caregiver) {
        return Err(Error::BadRequest {
            message: "User is not a caregiver".to_string(),
        });
    }
    if caregiver.kyc_status != KycStatus::Verified {
        return Err(Error::BadRequest {
            message: "Caregiver has not completed identity verification".to_string(),
        });
    }

    let job = Jobs::new(&mut pool_conn).assign_caregiver(job_id, request.caregiver_id).await?;
    Ok(Json(job.into()))
}

/// Move a job through its lifecycle.
#[utoipa::path(
    patch,
    path = "/api/v1/jobs/{job_id}/status",
    params(("job_id" = String, Path, description = "Job ID")),
    request_body = JobStatusUpdate,
    responses(
        (status = 200, description = "Updated job", body = JobResponse),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Transition not allowed from the current status"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "jobs"
)]
#[tracing::instrument(skip_all)]
pub async fn set_job_status(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Jobs, operation::UpdateOwn>,
    Path(job_id): Path<JobId>,
    Json(request): Json<JobStatusUpdate>,
) -> Result<Json<JobResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Jobs::new(&mut pool_conn);

    let job = repo.get_by_id(job_id).await?.ok_or_else(|| job_not_found(job_id))?;
    if !is_participant(&job, &current_user) && !has_permission(&current_user, Resource::Jobs, Operation::UpdateAll) {
        return Err(job_not_found(job_id));
    }

    let job = repo.set_status(job_id, request.status).await?;
    Ok(Json(job.into()))
}

/// Delete a job. Guardians can only withdraw jobs that are still pending.
#[utoipa::path(
    delete,
    path = "/api/v1/jobs/{job_id}",
    params(("job_id" = String, Path, description = "Job ID")),
    responses(
        (status = 204, description = "Job deleted"),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Job already in progress"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "jobs"
)]
#[tracing::instrument(skip_all)]
pub async fn delete_job(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Jobs, operation::DeleteOwn>,
    Path(job_id): Path<JobId>,
) -> Result<StatusCode> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Jobs::new(&mut pool_conn);

    let job = repo.get_by_id(job_id).await?.ok_or_else(|| job_not_found(job_id))?;
    let delete_all = has_permission(&current_user, Resource::Jobs, Operation::DeleteAll);
    if job.guardian_id != current_user.id && !delete_all {
        return Err(job_not_found(job_id));
    }
    if !delete_all && job.status != JobStatus::Pending {
        return Err(Error::Conflict {
            message: "Only pending jobs can be withdrawn".to_string(),
        });
    }

    repo.delete(job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
