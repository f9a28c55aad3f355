//! Feedback handlers.
//!
//! Ratings are submitted by job participants after the job completes, and
//! are readable by any authenticated user so guardians can evaluate
//! caregivers before hiring.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        feedback::{FeedbackCreate, FeedbackResponse, ListFeedbackQuery},
        pagination::PaginatedResponse,
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Feedback, Jobs, Repository, feedback::FeedbackFilter},
        models::{feedback::FeedbackCreateDBRequest, jobs::JobDBResponse},
    },
    errors::{Error, Result},
    types::{FeedbackId, UserId},
};

fn feedback_not_found(id: FeedbackId) -> Error {
    Error::NotFound {
        resource: "Feedback".to_string(),
        id: id.to_string(),
    }
}

/// The counterparty a job participant reviews, if the caller is a participant.
fn review_counterparty(job: &JobDBResponse, author_id: UserId) -> Option<UserId> {
    if job.guardian_id == author_id {
        job.caregiver_id
    } else if job.caregiver_id == Some(author_id) {
        Some(job.guardian_id)
    } else {
        None
    }
}

/// Submit a rating for the other party of a completed job.
#[utoipa::path(
    post,
    path = "/api/v1/feedback",
    request_body = FeedbackCreate,
    responses(
        (status = 201, description = "Feedback created", body = FeedbackResponse),
        (status = 400, description = "Invalid job, recipient, or rating"),
        (status = 409, description = "Job not completed or feedback already submitted"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "feedback"
)]
#[tracing::instrument(skip_all)]
pub async fn create_feedback(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Feedback, operation::CreateOwn>,
    Json(request): Json<FeedbackCreate>,
) -> Result<(StatusCode, Json<FeedbackResponse>)> {
    if !(1..=5).contains(&request.rating) {
        return Err(Error::BadRequest {
            message: "Rating must be between 1 and 5".to_string(),
        });
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let job = Jobs::new(&mut pool_conn)
        .get_by_id(request.job_id)
        .await?
        .ok_or_else(|| Error::BadRequest {
            message: "Job does not exist".to_string(),
        })?;

    let counterparty = review_counterparty(&job, current_user.id).ok_or_else(|| Error::BadRequest {
        message: "Only job participants can leave feedback".to_string(),
    })?;
    if request.recipient_id != counterparty {
        return Err(Error::BadRequest {
            message: "Feedback must be addressed to the other party of the job".to_string(),
        });
    }
    if job.status != crate::api::models::jobs::JobStatus::Completed {
        return Err(Error::Conflict {
            message: "Feedback can only be left on completed jobs".to_string(),
        });
    }

    let feedback = Feedback::new(&mut pool_conn)
        .create(&FeedbackCreateDBRequest {
            job_id: request.job_id,
            author_id: current_user.id,
            recipient_id: request.recipient_id,
            rating: request.rating,
            comment: request.comment,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(feedback.into())))
}

/// List feedback, optionally filtered by job or recipient.
///
/// Ratings are marketplace-public, so there is no ownership scoping here.
#[utoipa::path(
    get,
    path = "/api/v1/feedback",
    params(ListFeedbackQuery),
    responses((status = 200, description = "Paginated list of feedback", body = PaginatedResponse<FeedbackResponse>)),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "feedback"
)]
#[tracing::instrument(skip_all)]
pub async fn list_feedback(
    State(state): State<AppState>,
    _current_user: RequiresPermission<resource::Feedback, operation::ReadOwn>,
    Query(query): Query<ListFeedbackQuery>,
) -> Result<Json<PaginatedResponse<FeedbackResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = FeedbackFilter {
        skip,
        limit,
        job_id: query.job_id,
        recipient_id: query.recipient_id,
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Feedback::new(&mut pool_conn);
    let feedback = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        feedback.into_iter().map(FeedbackResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Get a single feedback entry.
#[utoipa::path(
    get,
    path = "/api/v1/feedback/{feedback_id}",
    params(("feedback_id" = String, Path, description = "Feedback ID")),
    responses(
        (status = 200, description = "The feedback", body = FeedbackResponse),
        (status = 404, description = "Feedback not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "feedback"
)]
#[tracing::instrument(skip_all)]
pub async fn get_feedback(
    State(state): State<AppState>,
    _current_user: RequiresPermission<resource::Feedback, operation::ReadOwn>,
    Path(feedback_id): Path<FeedbackId>,
) -> Result<Json<FeedbackResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let feedback = Feedback::new(&mut pool_conn)
        .get_by_id(feedback_id)
        .await?
        .ok_or_else(|| feedback_not_found(feedback_id))?;

    Ok(Json(feedback.into()))
}

/// Remove a feedback entry. Admin only, for abuse takedowns.
#[utoipa::path(
    delete,
    path = "/api/v1/feedback/{feedback_id}",
    params(("feedback_id" = String, Path, description = "Feedback ID")),
    responses(
        (status = 204, description = "Feedback deleted"),
        (status = 404, description = "Feedback not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "feedback"
)]
#[tracing::instrument(skip_all)]
pub async fn delete_feedback(
    State(state): State<AppState>,
    _current_user: RequiresPermission<resource::Feedback, operation::DeleteAll>,
    Path(feedback_id): Path<FeedbackId>,
) -> Result<StatusCode> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Feedback::new(&mut pool_conn);

    repo.get_by_id(feedback_id)
        .await?
        .ok_or_else(|| feedback_not_found(feedback_id))?;
    repo.delete(feedback_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
