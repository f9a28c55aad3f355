//! Platform analytics endpoint, staff only.

use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    AppState,
    api::models::analytics::{AnalyticsQuery, AnalyticsReport},
    auth::permissions::{RequiresPermission, operation, resource},
    db::handlers::Analytics,
    errors::{Error, Result},
};

/// Produce an aggregated report over a trailing window.
#[utoipa::path(
    get,
    path = "/api/v1/analytics",
    params(AnalyticsQuery),
    responses(
        (status = 200, description = "The requested report", body = AnalyticsReport),
        (status = 403, description = "Caller is not staff"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "analytics"
)]
#[tracing::instrument(skip_all)]
pub async fn get_analytics(
    State(state): State<AppState>,
    _current_user: RequiresPermission<resource::Analytics, operation::ReadAll>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsReport>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let report = Analytics::new(&mut pool_conn)
        .report(query.report_type, query.period)
        .await?;

    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        create_completed_payment, create_guardian, create_moderator, create_test_config, test_state, token_for,
    };
    use axum::http::StatusCode;
    use axum::{Router, routing::get};
    use axum_test::TestServer;
    use sqlx::PgPool;

    fn analytics_router(state: AppState) -> Router {
        Router::new().route("/analytics", get(get_analytics)).with_state(state)
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_overview_report_for_staff(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        let moderator = create_moderator(&mut conn, "mod1").await;
        create_completed_payment(&mut conn, &guardian).await;
        drop(conn);

        let server = TestServer::new(analytics_router(test_state(pool, config.clone()))).unwrap();

        let response = server
            .get("/analytics?type=overview&period=30d")
            .authorization_bearer(token_for(&moderator, &config))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["type"], "overview");
        assert_eq!(body["total_users"], 2);
        assert_eq!(body["total_jobs"], 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_analytics_forbidden_for_marketplace_roles(pool: PgPool) {
        let config = create_test_config();
        let mut conn = pool.acquire().await.unwrap();
        let guardian = create_guardian(&mut conn, "guardian1").await;
        drop(conn);

        let server = TestServer::new(analytics_router(test_state(pool, config.clone()))).unwrap();

        server
            .get("/analytics?type=overview")
            .authorization_bearer(token_for(&guardian, &config))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}
