//! # CareNet: a caregiving marketplace backend
//!
//! CareNet connects guardians who need care for a family member with
//! caregivers and care agencies. Guardians register patients, post
//! caregiving jobs, and pay through mobile financial gateways; the money is
//! held in escrow until care is delivered, with a moderator-arbitrated
//! dispute process when it isn't.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for
//! the HTTP layer and uses PostgreSQL for all persistence.
//!
//! The **API layer** ([`api`]) exposes authentication routes at
//! `/authentication/*` and the REST API at `/api/v1/*`: users, agencies,
//! patients, jobs, payments, escrows, disputes, feedback, care logs, and a
//! staff-only analytics endpoint. The OpenAPI document is served at
//! `/api-docs/openapi.json` with a RapiDoc UI on `/docs`.
//!
//! The **authentication layer** ([`auth`]) issues HS256-signed JWTs on
//! login, accepted either as a secure session cookie (browsers) or a bearer
//! token (programmatic clients). Authorization is role-based: each of the
//! five roles maps to a static set of (resource, operation) grants, checked
//! by an extractor in the handler signature.
//!
//! The **database layer** ([`db`]) uses the repository pattern; each table
//! has a repository operating on a `PgConnection`, so repositories compose
//! inside a caller-owned transaction. The escrow repository owns the coupled
//! payment/escrow/dispute state transitions.
//!
//! The **payment layer** ([`payment_providers`]) abstracts the bKash and
//! Nagad gateways behind a [`payment_providers::PaymentProvider`] trait,
//! with a deterministic dummy provider for development and tests.
//!
//! A **background maintenance task** ([`maintenance`]) enforces retention on
//! the audit and login-attempt tables and flags suspicious login sources.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use carenet::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = carenet::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     carenet::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Database Setup
//!
//! The application requires PostgreSQL and runs migrations on startup:
//!
//! ```no_run
//! # use sqlx::PgPool;
//! # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
//! carenet::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod maintenance;
mod openapi;
pub mod payment_providers;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use crate::{
    api::handlers,
    api::models::users::Role,
    auth::password,
    config::CorsOrigin,
    db::handlers::{Repository, Users},
    db::models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    openapi::ApiDoc,
    payment_providers::PaymentProvider,
};
use axum::http::HeaderValue;
use axum::{
    Router, http,
    routing::{get, patch, post},
};
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, info, instrument, Level};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

pub use types::{AgencyId, CareLogId, DisputeId, EscrowId, FeedbackId, JobId, PatientId, PaymentId, UserId};

/// Application state shared across all request handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub payments: Arc<dyn PaymentProvider>,
}

/// Get the carenet database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial admin user if it doesn't exist.
///
/// Idempotent: creates the admin on first startup, or refreshes the password
/// on later startups when one is configured.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(
    email: &str,
    username: &str,
    admin_password: Option<&str>,
    db: &PgPool,
) -> anyhow::Result<UserId> {
    let password_hash = admin_password.map(password::hash_string).transpose()?;

    let mut tx = db.begin().await?;
    let mut users = Users::new(&mut tx);

    if let Some(existing) = users.get_user_by_email(email).await? {
        if password_hash.is_some() {
            users
                .update(
                    existing.id,
                    &UserUpdateDBRequest {
                        password_hash,
                        ..Default::default()
                    },
                )
                .await?;
        }
        tx.commit().await?;
        return Ok(existing.id);
    }

    let created = users
        .create(&UserCreateDBRequest {
            username: username.to_string(),
            email: email.to_string(),
            phone: None,
            display_name: None,
            is_admin: true,
            roles: vec![Role::Admin],
            auth_source: "system".to_string(),
            password_hash,
        })
        .await?;
    info!(user_id = %created.id, "initial admin user created");

    tx.commit().await?;
    Ok(created.id)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(config.cors.allow_credentials)
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the main application router with all endpoints and middleware.
///
/// Authentication routes sit at the root level; the REST API is nested
/// under `/api/v1`. CORS and tracing are applied to the whole router.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let auth_routes = Router::new()
        .route("/authentication/register", post(handlers::auth::register))
        .route("/authentication/login", post(handlers::auth::login))
        .route("/authentication/logout", post(handlers::auth::logout))
        .route("/authentication/password-change", post(handlers::auth::change_password))
        .with_state(state.clone());

    let api_routes = Router::new()
        // User management
        .route("/users", get(handlers::users::list_users))
        .route(
            "/users/{user_id}",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        .route("/users/{user_id}/kyc", patch(handlers::users::set_kyc_status))
        // Agency directory
        .route(
            "/agencies",
            get(handlers::agencies::list_agencies).post(handlers::agencies::create_agency),
        )
        .route(
            "/agencies/{agency_id}",
            get(handlers::agencies::get_agency)
                .put(handlers::agencies::update_agency)
                .delete(handlers::agencies::delete_agency),
        )
        // Patients under guardianship
        .route(
            "/patients",
            get(handlers::patients::list_patients).post(handlers::patients::create_patient),
        )
        .route(
            "/patients/{patient_id}",
            get(handlers::patients::get_patient)
                .put(handlers::patients::update_patient)
                .delete(handlers::patients::delete_patient),
        )
        // Jobs and their lifecycle
        .route("/jobs", get(handlers::jobs::list_jobs).post(handlers::jobs::create_job))
        .route(
            "/jobs/{job_id}",
            get(handlers::jobs::get_job)
                .put(handlers::jobs::update_job)
                .delete(handlers::jobs::delete_job),
        )
        .route("/jobs/{job_id}/caregiver", post(handlers::jobs::assign_caregiver))
        .route("/jobs/{job_id}/status", patch(handlers::jobs::set_job_status))
        // Payments
        .route(
            "/payments",
            get(handlers::payments::list_payments).post(handlers::payments::create_payment),
        )
        .route("/payments/{payment_id}", get(handlers::payments::get_payment))
        .route("/payments/{payment_id}/confirm", post(handlers::payments::confirm_payment))
        // Escrow
        .route(
            "/escrows",
            get(handlers::escrow::list_escrows).post(handlers::escrow::create_escrow),
        )
        .route("/escrows/{escrow_id}", get(handlers::escrow::get_escrow))
        .route("/escrows/{escrow_id}/release", post(handlers::escrow::release_escrow))
        .route("/escrows/{escrow_id}/refund", post(handlers::escrow::refund_escrow))
        .route("/escrows/{escrow_id}/disputes", post(handlers::escrow::open_dispute))
        // Disputes
        .route("/disputes", get(handlers::disputes::list_disputes))
        .route("/disputes/{dispute_id}", get(handlers::disputes::get_dispute))
        .route("/disputes/{dispute_id}/resolve", post(handlers::disputes::resolve_dispute))
        // Feedback
        .route(
            "/feedback",
            get(handlers::feedback::list_feedback).post(handlers::feedback::create_feedback),
        )
        .route(
            "/feedback/{feedback_id}",
            get(handlers::feedback::get_feedback).delete(handlers::feedback::delete_feedback),
        )
        // Care logs
        .route(
            "/care-logs",
            get(handlers::care_logs::list_care_logs).post(handlers::care_logs::create_care_log),
        )
        .route("/care-logs/{care_log_id}", get(handlers::care_logs::get_care_log))
        // Analytics (staff only)
        .route("/analytics", get(handlers::analytics::get_analytics))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(auth_routes)
        .nest("/api/v1", api_routes)
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/docs"));

    let cors_layer = create_cors_layer(&state.config)?;
    let router = router.layer(cors_layer).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] connects to the database, runs
///    migrations, seeds the admin user, builds the payment provider, and
///    spawns the maintenance task.
/// 2. **Serve**: [`Application::serve`] binds a TCP port and handles
///    requests until the shutdown future resolves, then stops background
///    work and closes the pool.
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    shutdown_token: CancellationToken,
    maintenance_task: Option<tokio::task::JoinHandle<()>>,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting CareNet with configuration: {:#?}", config);

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.database.acquire_timeout_secs))
            .connect(&config.database.url)
            .await?;
        migrator().run(&pool).await?;

        create_initial_admin_user(
            &config.admin_email,
            &config.admin_username,
            config.admin_password.as_deref(),
            &pool,
        )
        .await?;

        let payments = payment_providers::from_config(&config.payment)?;
        info!(provider = payments.name(), "payment provider configured");

        let shutdown_token = CancellationToken::new();
        let maintenance_task = if config.maintenance.enabled {
            Some(maintenance::spawn(
                pool.clone(),
                config.maintenance.clone(),
                shutdown_token.clone(),
            ))
        } else {
            info!("maintenance task disabled by configuration");
            None
        };

        let state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .payments(payments)
            .build();
        let router = build_router(state)?;

        Ok(Self {
            router,
            config,
            pool,
            shutdown_token,
            maintenance_task,
        })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("CareNet listening on http://{bind_addr}");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        self.shutdown_token.cancel();
        if let Some(task) = self.maintenance_task {
            let _ = task.await;
        }

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}
