//! Escrow handlers.
//!
//! Holds are normally created automatically when a payment confirms; the
//! manual create endpoint exists for staff to repair out-of-band payments.
//! Release is available to the paying guardian, refund is a staff action,
//! and either party can escalate a held escrow into a dispute.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        disputes::{DisputeOpenRequest, DisputeResponse},
        escrow::{EscrowActionRequest, EscrowCreate, EscrowResponse, ListEscrowsQuery},
        pagination::PaginatedResponse,
    },
    auth::permissions::{RequiresPermission, can_read_all_resources, has_permission, operation, permission_denied, resource},
    db::{
        handlers::{Escrows, escrow::EscrowFilter},
        models::{disputes::DisputeCreateDBRequest, escrow::EscrowWithPartiesDBResponse},
    },
    errors::{Error, Result},
    types::{EscrowId, Operation, Resource},
};

fn escrow_not_found(id: EscrowId) -> Error {
    Error::NotFound {
        resource: "Escrow".to_string(),
        id: id.to_string(),
    }
}

fn is_party(escrow: &EscrowWithPartiesDBResponse, user_id: uuid::Uuid) -> bool {
    escrow.guardian_id == user_id
        || escrow.caregiver_id == Some(user_id)
        || escrow.agency_owner_id == Some(user_id)
}

/// List escrow transactions on jobs the caller participates in.
#[utoipa::path(
    get,
    path = "/api/v1/escrows",
    params(ListEscrowsQuery),
    responses((status = 200, description = "Paginated list of escrows", body = PaginatedResponse<EscrowResponse>)),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "escrows"
)]
#[tracing::instrument(skip_all)]
pub async fn list_escrows(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Escrows, operation::ReadOwn>,
    Query(query): Query<ListEscrowsQuery>,
) -> Result<Json<PaginatedResponse<EscrowResponse>>> {
    let (skip, limit) = query.pagination.params();
    let party = if can_read_all_resources(&current_user, Resource::Escrows) {
        None
    } else {
        Some(current_user.id)
    };
    let filter = EscrowFilter {
        skip,
        limit,
        status: query.status,
        party,
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Escrows::new(&mut pool_conn);
    let escrows = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        escrows.into_iter().map(EscrowResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Get a single escrow transaction.
#[utoipa::path(
    get,
    path = "/api/v1/escrows/{escrow_id}",
    params(("escrow_id" = String, Path, description = "Escrow ID")),
    responses(
        (status = 200, description = "The escrow", body = EscrowResponse),
        (status = 404, description = "Escrow not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "escrows"
)]
#[tracing::instrument(skip_all)]
pub async fn get_escrow(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Escrows, operation::ReadOwn>,
    Path(escrow_id): Path<EscrowId>,
) -> Result<Json<EscrowResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Escrows::new(&mut pool_conn);

    let escrow = repo
        .get_with_parties(escrow_id)
        .await?
        .ok_or_else(|| escrow_not_found(escrow_id))?;
    if !is_party(&escrow, current_user.id) && !can_read_all_resources(&current_user, Resource::Escrows) {
        return Err(escrow_not_found(escrow_id));
    }

    let escrow = repo.get_by_id(escrow_id).await?.ok_or_else(|| escrow_not_found(escrow_id))?;
    Ok(Json(escrow.into()))
}

/// Manually hold a confirmed payment in escrow. Staff only.
#[utoipa::path(
    post,
    path = "/api/v1/escrows",
    request_body = EscrowCreate,
    responses(
        (status = 201, description = "Escrow hold created", body = EscrowResponse),
        (status = 404, description = "Payment not found"),
        (status = 409, description = "Payment is not in a holdable state"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "escrows"
)]
#[tracing::instrument(skip_all)]
pub async fn create_escrow(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Escrows, operation::CreateAll>,
    Json(request): Json<EscrowCreate>,
) -> Result<(StatusCode, Json<EscrowResponse>)> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let escrow = Escrows::new(&mut pool_conn).hold(request.payment_id, current_user.id).await?;
    Ok((StatusCode::CREATED, Json(escrow.into())))
}

/// Release held funds to the caregiver side.
///
/// Available to the paying guardian once care is done, and to staff.
#[utoipa::path(
    post,
    path = "/api/v1/escrows/{escrow_id}/release",
    params(("escrow_id" = String, Path, description = "Escrow ID")),
    request_body = EscrowActionRequest,
    responses(
        (status = 200, description = "Escrow released", body = EscrowResponse),
        (status = 404, description = "Escrow not found"),
        (status = 409, description = "Escrow is not held"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "escrows"
)]
#[tracing::instrument(skip_all)]
pub async fn release_escrow(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Escrows, operation::UpdateOwn>,
    Path(escrow_id): Path<EscrowId>,
    body: Option<Json<EscrowActionRequest>>,
) -> Result<Json<EscrowResponse>> {
    let reason = body.and_then(|Json(b)| b.reason);

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Escrows::new(&mut pool_conn);

    let escrow = repo
        .get_with_parties(escrow_id)
        .await?
        .ok_or_else(|| escrow_not_found(escrow_id))?;
    // Only the guardian who funded the job may release; caregivers cannot
    // release money to themselves
    if escrow.guardian_id != current_user.id && !has_permission(&current_user, Resource::Escrows, Operation::UpdateAll)
    {
        return Err(permission_denied(Resource::Escrows, Operation::UpdateAll));
    }

    let escrow = repo.release(escrow_id, current_user.id, reason.as_deref()).await?;
    Ok(Json(escrow.into()))
}

/// Refund held funds to the payer. Staff only.
///
/// The local transition and the gateway refund succeed or fail together:
/// the database work commits only after the gateway accepts the refund.
#[utoipa::path(
    post,
    path = "/api/v1/escrows/{escrow_id}/refund",
    params(("escrow_id" = String, Path, description = "Escrow ID")),
    request_body = EscrowActionRequest,
    responses(
        (status = 200, description = "Escrow refunded", body = EscrowResponse),
        (status = 404, description = "Escrow not found"),
        (status = 409, description = "Escrow is not held"),
        (status = 502, description = "Gateway refused the refund"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "escrows"
)]
#[tracing::instrument(skip_all)]
pub async fn refund_escrow(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Escrows, operation::UpdateAll>,
    Path(escrow_id): Path<EscrowId>,
    body: Option<Json<EscrowActionRequest>>,
) -> Result<Json<EscrowResponse>> {
    let reason = body.and_then(|Json(b)| b.reason);

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let (escrow, payment) = Escrows::new(&mut tx)
        .refund(escrow_id, current_user.id, reason.as_deref())
        .await?;

    let transaction_id = payment.transaction_id.ok_or_else(|| Error::Internal {
        operation: "refund a payment without a transaction id".to_string(),
    })?;
    state
        .payments
        .refund(&transaction_id, payment.amount, &payment.currency)
        .await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    Ok(Json(escrow.into()))
}

/// Open a dispute over a held escrow.
///
/// Either party of the funded job can escalate; the escrow moves to
/// DISPUTED and is frozen until a moderator resolves it.
#[utoipa::path(
    post,
    path = "/api/v1/escrows/{escrow_id}/disputes",
    params(("escrow_id" = String, Path, description = "Escrow ID")),
    request_body = DisputeOpenRequest,
    responses(
        (status = 201, description = "Dispute opened", body = DisputeResponse),
        (status = 404, description = "Escrow not found"),
        (status = 409, description = "Escrow is not held"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "disputes"
)]
#[tracing::instrument(skip_all)]
pub async fn open_dispute(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Disputes, operation::CreateOwn>,
    Path(escrow_id): Path<EscrowId>,
    Json(request): Json<DisputeOpenRequest>,
) -> Result<(StatusCode, Json<DisputeResponse>)> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Escrows::new(&mut pool_conn);

    let escrow = repo
        .get_with_parties(escrow_id)
        .await?
        .ok_or_else(|| escrow_not_found(escrow_id))?;
    if !is_party(&escrow, current_user.id) && !has_permission(&current_user, Resource::Disputes, Operation::CreateAll)
    {
        return Err(escrow_not_found(escrow_id));
    }

    let dispute = repo
        .open_dispute(&DisputeCreateDBRequest {
            escrow_id,
            job_id: escrow.job_id,
            opened_by: current_user.id,
            reason: request.reason,
            description: request.description,
            evidence: request.evidence,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(dispute.into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{escrow::EscrowStatus, payments::PaymentStatus};
    use crate::db::handlers::{Agencies, Jobs, Payments, Repository, Users};
    use crate::test_utils::{
        create_agency_owner, create_caregiver, create_completed_payment, create_guardian, create_moderator,
        create_test_config, test_state, token_for,
    };
    use axum::{
        Router,
        routing::{get, post},
    };
    use axum_test::TestServer;
    use serde_json::json;
    use sqlx::PgPool;

    fn escrows_router(state: AppState) -> Router {
        Router::new()
            .route("/escrows", get(list_escrows).post(create_escrow))
            .route("/escrows/{escrow_id}", get(get_escrow))
            .route("/escrows/{escrow_id}/release", post(release_escrow))
            .route("/escrows/{escrow_id}/refund", post(refund_escrow))
            .route("/escrows/{escrow_id}/disputes", post(open_dispute))
            .with_state(state)
    }

    async fn held_escrow(pool: &PgPool, guardian: &crate::db::models::users::UserDBResponse) -> (EscrowResponse, uuid::Uuid) {
        let mut conn = pool.acquire().await.unwrap();
        let (payment, job) = create_completed_payment(&mut conn, guardian).await;
        let escrow = Escrows::new(&mut conn).hold(payment.id, guardian.id).await.unwrap();
        (escrow.into(), job.id)
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_guardian_releases_own_escrow(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        drop(conn);
        let (escrow, _) = held_escrow(&pool, &guardian).await;

        let server = TestServer::new(escrows_router(test_state(pool.clone(), config.clone()))).unwrap();

        let response = server
            .post(&format!("/escrows/{}/release", escrow.id))
            .authorization_bearer(token_for(&guardian, &config))
            .json(&json!({"reason": "care completed"}))
            .await;
        response.assert_status_ok();
        let released: EscrowResponse = response.json();
        assert_eq!(released.status, EscrowStatus::Released);
        assert_eq!(released.action_reason.as_deref(), Some("care completed"));

        let mut conn = pool.acquire().await.unwrap();
        let payment = Payments::new(&mut conn).get_by_id(escrow.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Released);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_caregiver_cannot_release(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        let caregiver = create_caregiver(&mut conn, "caregiver1").await;
        Users::new(&mut conn)
            .set_kyc_status(caregiver.id, crate::api::models::users::KycStatus::Verified)
            .await
            .unwrap();
        drop(conn);
        let (escrow, job_id) = held_escrow(&pool, &guardian).await;

        let mut conn = pool.acquire().await.unwrap();
        Jobs::new(&mut conn).assign_caregiver(job_id, caregiver.id).await.unwrap();
        drop(conn);

        let server = TestServer::new(escrows_router(test_state(pool, config.clone()))).unwrap();

        // Assigned caregiver can read the escrow but not release it
        server
            .get(&format!("/escrows/{}", escrow.id))
            .authorization_bearer(token_for(&caregiver, &config))
            .await
            .assert_status_ok();
        server
            .post(&format!("/escrows/{}/release", escrow.id))
            .authorization_bearer(token_for(&caregiver, &config))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_refund_is_staff_only(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        let moderator = create_moderator(&mut conn, "mod1").await;
        drop(conn);
        let (escrow, _) = held_escrow(&pool, &guardian).await;

        let server = TestServer::new(escrows_router(test_state(pool.clone(), config.clone()))).unwrap();

        server
            .post(&format!("/escrows/{}/refund", escrow.id))
            .authorization_bearer(token_for(&guardian, &config))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let response = server
            .post(&format!("/escrows/{}/refund", escrow.id))
            .authorization_bearer(token_for(&moderator, &config))
            .json(&json!({"reason": "guardian complaint upheld"}))
            .await;
        response.assert_status_ok();
        let refunded: EscrowResponse = response.json();
        assert_eq!(refunded.status, EscrowStatus::Refunded);

        let mut conn = pool.acquire().await.unwrap();
        let payment = Payments::new(&mut conn).get_by_id(escrow.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_party_opens_dispute_and_escrow_freezes(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        let outsider = create_guardian(&mut conn, "guardian2").await;
        drop(conn);
        let (escrow, _) = held_escrow(&pool, &guardian).await;

        let server = TestServer::new(escrows_router(test_state(pool, config.clone()))).unwrap();

        // Unrelated users cannot even see the escrow
        server
            .post(&format!("/escrows/{}/disputes", escrow.id))
            .authorization_bearer(token_for(&outsider, &config))
            .json(&json!({"reason": "not mine"}))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let response = server
            .post(&format!("/escrows/{}/disputes", escrow.id))
            .authorization_bearer(token_for(&guardian, &config))
            .json(&json!({"reason": "caregiver absent", "description": "no-show for three days"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let dispute: DisputeResponse = response.json();
        assert_eq!(dispute.escrow_id, escrow.id);

        // A disputed escrow can no longer be released
        server
            .post(&format!("/escrows/{}/release", escrow.id))
            .authorization_bearer(token_for(&guardian, &config))
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_agency_owner_is_a_party(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        let owner = create_agency_owner(&mut conn, "agency1").await;
        let agency = Agencies::new(&mut conn)
            .create(&crate::db::models::agencies::AgencyCreateDBRequest {
                owner_id: owner.id,
                name: "Shefa Care Services".to_string(),
                license_number: "DHK-2026-0042".to_string(),
            })
            .await
            .unwrap();
        let patient = crate::test_utils::create_patient(&mut conn, guardian.id).await;
        let job = Jobs::new(&mut conn)
            .create(&crate::db::models::jobs::JobCreateDBRequest {
                guardian_id: guardian.id,
                patient_id: patient.id,
                agency_id: Some(agency.id),
                description: "Agency-managed elderly care".to_string(),
                daily_rate: rust_decimal::Decimal::new(180000, 2),
                currency: "BDT".to_string(),
                start_date: chrono::NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
                end_date: None,
            })
            .await
            .unwrap();
        let payment = crate::test_utils::create_payment(&mut conn, job.id, guardian.id).await;
        let mut payments = Payments::new(&mut conn);
        payments.confirm(payment.id, "TXN-AGENCY-1").await.unwrap();
        let escrow = Escrows::new(&mut conn).hold(payment.id, guardian.id).await.unwrap();
        drop(conn);

        let server = TestServer::new(escrows_router(test_state(pool, config.clone()))).unwrap();
        let token = token_for(&owner, &config);

        // The agency tied to the job sees the escrow both in the list and directly
        let response = server.get("/escrows").authorization_bearer(&token).await;
        let body: serde_json::Value = response.json();
        assert_eq!(body["total_count"], 1);

        server
            .get(&format!("/escrows/{}", escrow.id))
            .authorization_bearer(&token)
            .await
            .assert_status_ok();

        // And may escalate it into a dispute
        let response = server
            .post(&format!("/escrows/{}/disputes", escrow.id))
            .authorization_bearer(&token)
            .json(&json!({"reason": "guardian withholding access to the patient"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let dispute: DisputeResponse = response.json();
        assert_eq!(dispute.opened_by, owner.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_escrow_list_scoped_to_party(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        let other = create_guardian(&mut conn, "guardian2").await;
        drop(conn);
        held_escrow(&pool, &guardian).await;

        let server = TestServer::new(escrows_router(test_state(pool, config.clone()))).unwrap();

        let response = server
            .get("/escrows")
            .authorization_bearer(token_for(&other, &config))
            .await;
        let body: serde_json::Value = response.json();
        assert_eq!(body["total_count"], 0);

        let response = server
            .get("/escrows")
            .authorization_bearer(token_for(&guardian, &config))
            .await;
        let body: serde_json::Value = response.json();
        assert_eq!(body["total_count"], 1);
    }
}
