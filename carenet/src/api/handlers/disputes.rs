//! Dispute handlers.
//!
//! Disputes are opened through the escrow endpoints; this module covers
//! reading them and the moderator-only resolution step. Resolving with a
//! refund also pushes the refund to the payment gateway, inside the same
//! transaction as the local transitions.

use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::{
    AppState,
    api::models::{
        disputes::{DisputeResolution, DisputeResolveRequest, DisputeResponse, ListDisputesQuery},
        pagination::PaginatedResponse,
    },
    auth::permissions::{RequiresPermission, can_read_all_resources, operation, resource},
    db::handlers::{Agencies, Disputes, Escrows, Jobs, Repository, disputes::DisputeFilter},
    errors::{Error, Result},
    types::{DisputeId, Resource},
};

fn dispute_not_found(id: DisputeId) -> Error {
    Error::NotFound {
        resource: "Dispute".to_string(),
        id: id.to_string(),
    }
}

/// List disputes on jobs the caller participates in.
#[utoipa::path(
    get,
    path = "/api/v1/disputes",
    params(ListDisputesQuery),
    responses((status = 200, description = "Paginated list of disputes", body = PaginatedResponse<DisputeResponse>)),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "disputes"
)]
#[tracing::instrument(skip_all)]
pub async fn list_disputes(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Disputes, operation::ReadOwn>,
    Query(query): Query<ListDisputesQuery>,
) -> Result<Json<PaginatedResponse<DisputeResponse>>> {
    let (skip, limit) = query.pagination.params();
    let party = if can_read_all_resources(&current_user, Resource::Disputes) {
        None
    } else {
        Some(current_user.id)
    };
    let filter = DisputeFilter {
        skip,
        limit,
        status: query.status,
        party,
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Disputes::new(&mut pool_conn);
    let disputes = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        disputes.into_iter().map(DisputeResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Get a single dispute.
#[utoipa::path(
    get,
    path = "/api/v1/disputes/{dispute_id}",
    params(("dispute_id" = String, Path, description = "Dispute ID")),
    responses(
        (status = 200, description = "The dispute", body = DisputeResponse),
        (status = 404, description = "Dispute not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "disputes"
)]
#[tracing::instrument(skip_all)]
pub async fn get_dispute(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Disputes, operation::ReadOwn>,
    Path(dispute_id): Path<DisputeId>,
) -> Result<Json<DisputeResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Disputes::new(&mut pool_conn);

    let dispute = repo
        .get_by_id(dispute_id)
        .await?
        .ok_or_else(|| dispute_not_found(dispute_id))?;

    if !can_read_all_resources(&current_user, Resource::Disputes) && dispute.opened_by != current_user.id {
        let job = Jobs::new(&mut pool_conn).get_by_id(dispute.job_id).await?;
        let participates = match &job {
            Some(job) if job.guardian_id == current_user.id || job.caregiver_id == Some(current_user.id) => true,
            Some(job) => match job.agency_id {
                Some(agency_id) => Agencies::new(&mut pool_conn)
                    .get_by_id(agency_id)
                    .await?
                    .is_some_and(|a| a.owner_id == current_user.id),
                None => false,
            },
            None => false,
        };
        if !participates {
            return Err(dispute_not_found(dispute_id));
        }
    }

    Ok(Json(dispute.into()))
}

/// Resolve an open dispute. Staff only.
///
/// RELEASE pays the caregiver side; REFUND returns the money to the payer
/// and is only committed once the gateway accepts the refund.
#[utoipa::path(
    post,
    path = "/api/v1/disputes/{dispute_id}/resolve",
    params(("dispute_id" = String, Path, description = "Dispute ID")),
    request_body = DisputeResolveRequest,
    responses(
        (status = 200, description = "Resolved dispute", body = DisputeResponse),
        (status = 404, description = "Dispute not found"),
        (status = 409, description = "Dispute already resolved"),
        (status = 502, description = "Gateway refused the refund"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "disputes"
)]
#[tracing::instrument(skip_all)]
pub async fn resolve_dispute(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Disputes, operation::UpdateAll>,
    Path(dispute_id): Path<DisputeId>,
    Json(request): Json<DisputeResolveRequest>,
) -> Result<Json<DisputeResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let (dispute, _escrow, payment) = Escrows::new(&mut tx)
        .resolve_dispute(dispute_id, current_user.id, request.resolution, request.notes.as_deref())
        .await?;

    if request.resolution == DisputeResolution::Refund {
        let transaction_id = payment.transaction_id.ok_or_else(|| Error::Internal {
            operation: "refund a payment without a transaction id".to_string(),
        })?;
        state
            .payments
            .refund(&transaction_id, payment.amount, &payment.currency)
            .await?;
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    Ok(Json(dispute.into()))
}
