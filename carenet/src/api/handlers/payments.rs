//! Payment handlers.
//!
//! Creating a payment initiates a gateway checkout and stores the pending
//! payment with the gateway reference. Confirmation asks the gateway whether
//! checkout completed and, on success, marks the payment completed and holds
//! it in escrow within one transaction.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        pagination::PaginatedResponse,
        payments::{ListPaymentsQuery, PaymentCreate, PaymentCreatedResponse, PaymentResponse, PaymentStatus},
    },
    auth::permissions::{RequiresPermission, can_read_all_resources, has_permission, operation, resource},
    db::{
        handlers::{Escrows, Jobs, Payments, Repository, payments::{PaymentFilter, generate_invoice_number}},
        models::payments::PaymentCreateDBRequest,
    },
    errors::{Error, Result},
    payment_providers::VerifyOutcome,
    types::{Operation, PaymentId, Resource},
};

fn payment_not_found(id: PaymentId) -> Error {
    Error::NotFound {
        resource: "Payment".to_string(),
        id: id.to_string(),
    }
}

/// Start a payment for a job.
///
/// Initiates checkout with the configured gateway and records the pending
/// payment. The response carries the redirect URL when the gateway uses a
/// hosted checkout page.
#[utoipa::path(
    post,
    path = "/api/v1/payments",
    request_body = PaymentCreate,
    responses(
        (status = 201, description = "Payment initiated", body = PaymentCreatedResponse),
        (status = 400, description = "Invalid job reference"),
        (status = 502, description = "Gateway rejected the checkout"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "payments"
)]
#[tracing::instrument(skip_all)]
pub async fn create_payment(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Payments, operation::CreateOwn>,
    Json(request): Json<PaymentCreate>,
) -> Result<(StatusCode, Json<PaymentCreatedResponse>)> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let job = Jobs::new(&mut pool_conn)
        .get_by_id(request.job_id)
        .await?
        .ok_or_else(|| Error::BadRequest {
            message: "Job does not exist".to_string(),
        })?;
    if job.guardian_id != current_user.id && !has_permission(&current_user, Resource::Payments, Operation::CreateAll) {
        return Err(Error::BadRequest {
            message: "Payments can only be made for your own jobs".to_string(),
        });
    }

    let invoice_number = generate_invoice_number();
    let initiated = state
        .payments
        .initiate(&invoice_number, request.amount, &job.currency)
        .await?;

    let payment = Payments::new(&mut pool_conn)
        .create(&PaymentCreateDBRequest {
            job_id: job.id,
            payer_id: current_user.id,
            amount: request.amount,
            currency: job.currency,
            method: request.method,
            transaction_id: Some(initiated.gateway_ref),
            invoice_number,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PaymentCreatedResponse {
            payment: payment.into(),
            redirect_url: initiated.redirect_url,
        }),
    ))
}

/// Confirm a pending payment against the gateway.
///
/// If the gateway reports completion, the payment is marked completed and
/// immediately held in escrow; both happen in one transaction. A declined
/// checkout marks the payment failed.
#[utoipa::path(
    post,
    path = "/api/v1/payments/{payment_id}/confirm",
    params(("payment_id" = String, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment settled into escrow, or marked failed", body = PaymentResponse),
        (status = 404, description = "Payment not found"),
        (status = 409, description = "Payment is not pending"),
        (status = 502, description = "Gateway unavailable"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "payments"
)]
#[tracing::instrument(skip_all)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Payments, operation::CreateOwn>,
    Path(payment_id): Path<PaymentId>,
) -> Result<Json<PaymentResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let payment = Payments::new(&mut pool_conn)
        .get_by_id(payment_id)
        .await?
        .ok_or_else(|| payment_not_found(payment_id))?;
    if payment.payer_id != current_user.id && !has_permission(&current_user, Resource::Payments, Operation::UpdateAll) {
        return Err(payment_not_found(payment_id));
    }

    // Settled and failed payments never go back to the gateway; a second
    // confirm would otherwise verify the already-settled transaction id
    if payment.status != PaymentStatus::Pending {
        return Err(Error::Conflict {
            message: format!("Payment is {}, not PENDING", payment.status),
        });
    }

    let gateway_ref = payment.transaction_id.clone().ok_or_else(|| Error::BadRequest {
        message: "Payment has no gateway reference".to_string(),
    })?;

    match state.payments.verify(&gateway_ref).await? {
        VerifyOutcome::Confirmed { transaction_id } => {
            // Confirm and hold commit together
            let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
            Payments::new(&mut tx).confirm(payment_id, &transaction_id).await?;
            Escrows::new(&mut tx).hold(payment_id, current_user.id).await?;
            tx.commit().await.map_err(|e| Error::Database(e.into()))?;

            let payment = Payments::new(&mut pool_conn)
                .get_by_id(payment_id)
                .await?
                .ok_or_else(|| payment_not_found(payment_id))?;
            Ok(Json(payment.into()))
        }
        VerifyOutcome::Declined => {
            let payment = Payments::new(&mut pool_conn).mark_failed(payment_id).await?;
            Ok(Json(payment.into()))
        }
    }
}

/// List payments. Payers see their own; staff see everything.
#[utoipa::path(
    get,
    path = "/api/v1/payments",
    params(ListPaymentsQuery),
    responses((status = 200, description = "Paginated list of payments", body = PaginatedResponse<PaymentResponse>)),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "payments"
)]
#[tracing::instrument(skip_all)]
pub async fn list_payments(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Payments, operation::ReadOwn>,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<PaginatedResponse<PaymentResponse>>> {
    let (skip, limit) = query.pagination.params();
    let payer_id = if can_read_all_resources(&current_user, Resource::Payments) {
        None
    } else {
        Some(current_user.id)
    };
    let filter = PaymentFilter {
        skip,
        limit,
        status: query.status,
        method: query.method,
        payer_id,
        job_id: None,
        search: query.search,
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Payments::new(&mut pool_conn);
    let payments = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        payments.into_iter().map(PaymentResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Get a single payment.
#[utoipa::path(
    get,
    path = "/api/v1/payments/{payment_id}",
    params(("payment_id" = String, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "The payment", body = PaymentResponse),
        (status = 404, description = "Payment not found"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "payments"
)]
#[tracing::instrument(skip_all)]
pub async fn get_payment(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Payments, operation::ReadOwn>,
    Path(payment_id): Path<PaymentId>,
) -> Result<Json<PaymentResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let payment = Payments::new(&mut pool_conn)
        .get_by_id(payment_id)
        .await?
        .ok_or_else(|| payment_not_found(payment_id))?;

    if payment.payer_id != current_user.id && !can_read_all_resources(&current_user, Resource::Payments) {
        return Err(payment_not_found(payment_id));
    }

    Ok(Json(payment.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::payments::PaymentStatus;
    use crate::test_utils::{create_guardian, create_job, create_patient, create_test_config, test_state, token_for};
    use axum::{
        Router,
        routing::{get, post},
    };
    use axum_test::TestServer;
    use serde_json::json;
    use sqlx::PgPool;

    fn payments_router(state: AppState) -> Router {
        Router::new()
            .route("/payments", get(list_payments).post(create_payment))
            .route("/payments/{payment_id}", get(get_payment))
            .route("/payments/{payment_id}/confirm", post(confirm_payment))
            .with_state(state)
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_confirm_payment(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        let patient = create_patient(&mut conn, guardian.id).await;
        let job = create_job(&mut conn, guardian.id, patient.id).await;
        drop(conn);

        let server = TestServer::new(payments_router(test_state(pool.clone(), config.clone()))).unwrap();
        let token = token_for(&guardian, &config);

        let response = server
            .post("/payments")
            .authorization_bearer(&token)
            .json(&json!({"job_id": job.id, "amount": "10500.00", "method": "BKASH"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: PaymentCreatedResponse = response.json();
        assert_eq!(created.payment.status, PaymentStatus::Pending);
        assert!(created.payment.transaction_id.is_some());
        assert_eq!(created.payment.currency, "BDT");

        let response = server
            .post(&format!("/payments/{}/confirm", created.payment.id))
            .authorization_bearer(&token)
            .await;
        response.assert_status_ok();
        let confirmed: PaymentResponse = response.json();
        assert_eq!(confirmed.status, PaymentStatus::Escrow);
        assert!(confirmed.paid_at.is_some());

        // The escrow hold was created in the same transaction
        let held: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM escrow_transactions WHERE payment_id = $1")
            .bind(created.payment.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(held, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_double_confirm_conflicts(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        let patient = create_patient(&mut conn, guardian.id).await;
        let job = create_job(&mut conn, guardian.id, patient.id).await;
        drop(conn);

        let server = TestServer::new(payments_router(test_state(pool, config.clone()))).unwrap();
        let token = token_for(&guardian, &config);

        let response = server
            .post("/payments")
            .authorization_bearer(&token)
            .json(&json!({"job_id": job.id, "amount": "500.00", "method": "NAGAD"}))
            .await;
        let created: PaymentCreatedResponse = response.json();

        server
            .post(&format!("/payments/{}/confirm", created.payment.id))
            .authorization_bearer(&token)
            .await
            .assert_status_ok();
        server
            .post(&format!("/payments/{}/confirm", created.payment.id))
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_cannot_pay_for_another_guardians_job(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        let other = create_guardian(&mut conn, "guardian2").await;
        let patient = create_patient(&mut conn, guardian.id).await;
        let job = create_job(&mut conn, guardian.id, patient.id).await;
        drop(conn);

        let server = TestServer::new(payments_router(test_state(pool, config.clone()))).unwrap();

        server
            .post("/payments")
            .authorization_bearer(token_for(&other, &config))
            .json(&json!({"job_id": job.id, "amount": "500.00", "method": "CARD"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_payments_scoped_to_payer(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        let other = create_guardian(&mut conn, "guardian2").await;
        let patient = create_patient(&mut conn, guardian.id).await;
        let job = create_job(&mut conn, guardian.id, patient.id).await;
        drop(conn);

        let server = TestServer::new(payments_router(test_state(pool, config.clone()))).unwrap();

        let response = server
            .post("/payments")
            .authorization_bearer(token_for(&guardian, &config))
            .json(&json!({"job_id": job.id, "amount": "1200.00", "method": "BANK"}))
            .await;
        let created: PaymentCreatedResponse = response.json();

        // The other guardian neither lists nor reads it
        let response = server
            .get("/payments")
            .authorization_bearer(token_for(&other, &config))
            .await;
        let body: serde_json::Value = response.json();
        assert_eq!(body["total_count"], 0);

        server
            .get(&format!("/payments/{}", created.payment.id))
            .authorization_bearer(token_for(&other, &config))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
