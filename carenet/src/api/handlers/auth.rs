//! Authentication handlers: registration, login, logout and password change.
//!
//! Successful registration and login both set a session cookie and return the
//! JWT in the body, so browser clients can rely on the cookie while API
//! clients use the `Authorization: Bearer` header.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};

use crate::{
    AppState,
    api::models::{
        auth::{LoginRequest, LoginResponse, PasswordChangeRequest, RegisterRequest},
        users::{CurrentUser, Role},
    },
    auth::{
        password::{Argon2Params, hash_string_with_params, verify_string},
        session::create_session_token,
    },
    config::Config,
    db::{
        handlers::{LoginAttempts, Repository, Users},
        models::{audit::LoginAttemptDBRequest, users::{UserCreateDBRequest, UserUpdateDBRequest}},
    },
    errors::{Error, Result},
};

fn argon2_params(config: &Config) -> Argon2Params {
    Argon2Params {
        memory_kib: config.auth.password.argon2_memory_kib,
        iterations: config.auth.password.argon2_iterations,
        parallelism: config.auth.password.argon2_parallelism,
    }
}

fn validate_password(password: &str, config: &Config) -> Result<()> {
    let rules = &config.auth.password;
    if password.len() < rules.min_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {} characters", rules.min_length),
        });
    }
    if password.len() > rules.max_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at most {} characters", rules.max_length),
        });
    }
    Ok(())
}

async fn hash_password(password: String, config: &Config) -> Result<String> {
    let params = argon2_params(config);
    tokio::task::spawn_blocking(move || hash_string_with_params(&password, Some(params)))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("hash password: {e}"),
        })?
}

async fn verify_password(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_string(&password, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("verify password: {e}"),
        })?
}

/// Build the Set-Cookie value for a session token.
fn session_cookie(token: &str, config: &Config) -> String {
    let session = &config.auth.session;
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite={}; Max-Age={}",
        session.cookie_name,
        token,
        session.cookie_same_site,
        config.auth.jwt_expiry.as_secs()
    );
    if session.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// An immediately-expiring cookie that clears the session.
fn clear_session_cookie(config: &Config) -> String {
    let session = &config.auth.session;
    let mut cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite={}; Max-Age=0",
        session.cookie_name, session.cookie_same_site
    );
    if session.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Best-effort client IP for the login attempt log. Trusts proxy headers,
/// which is acceptable for anomaly detection but not for access control.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Register a new account.
///
/// Self-registration is limited to the marketplace roles. Staff accounts are
/// created by an admin through the users API.
#[utoipa::path(
    post,
    path = "/authentication/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = LoginResponse),
        (status = 400, description = "Invalid registration data"),
        (status = 409, description = "Email or username already taken"),
    ),
    tag = "authentication"
)]
#[tracing::instrument(skip_all, fields(email = %request.email))]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<impl IntoResponse> {
    if !state.config.auth.allow_registration {
        return Err(Error::BadRequest {
            message: "Registration is disabled".to_string(),
        });
    }
    if matches!(request.role, Role::Admin | Role::Moderator) {
        return Err(Error::BadRequest {
            message: "Cannot self-register with a staff role".to_string(),
        });
    }
    validate_password(&request.password, &state.config)?;

    let password_hash = hash_password(request.password, &state.config).await?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut pool_conn)
        .create(&UserCreateDBRequest {
            username: request.username,
            email: request.email,
            phone: request.phone,
            display_name: request.display_name,
            is_admin: false,
            roles: vec![request.role],
            auth_source: "password".to_string(),
            password_hash: Some(password_hash),
        })
        .await?;

    let token = create_session_token(&CurrentUser::from(user.clone()), &state.config)?;
    let cookie = session_cookie(&token, &state.config);

    Ok((
        StatusCode::CREATED,
        [(SET_COOKIE, cookie)],
        Json(LoginResponse {
            token,
            user: user.into(),
        }),
    ))
}

/// Log in with email and password.
#[utoipa::path(
    post,
    path = "/authentication/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
    ),
    tag = "authentication"
)]
#[tracing::instrument(skip_all, fields(email = %request.email))]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut pool_conn).get_user_by_email(&request.email).await?;
    let ip_address = client_ip(&headers);

    // Same response for unknown email and wrong password
    let invalid = || Error::Unauthenticated {
        message: Some("Invalid email or password".to_string()),
    };

    let Some(user) = user else {
        LoginAttempts::new(&mut pool_conn)
            .record_quietly(&LoginAttemptDBRequest {
                email: request.email,
                user_id: None,
                ip_address,
                success: false,
            })
            .await;
        return Err(invalid());
    };

    let valid = match user.password_hash.clone() {
        Some(hash) => verify_password(request.password, hash).await?,
        None => false,
    };

    LoginAttempts::new(&mut pool_conn)
        .record_quietly(&LoginAttemptDBRequest {
            email: request.email,
            user_id: Some(user.id),
            ip_address,
            success: valid,
        })
        .await;

    if !valid {
        return Err(invalid());
    }

    let token = create_session_token(&CurrentUser::from(user.clone()), &state.config)?;
    let cookie = session_cookie(&token, &state.config);

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(LoginResponse {
            token,
            user: user.into(),
        }),
    ))
}

/// Log out by clearing the session cookie.
#[utoipa::path(
    post,
    path = "/authentication/logout",
    responses((status = 204, description = "Session cleared")),
    tag = "authentication"
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, clear_session_cookie(&state.config))]))
}

/// Change the current user's password.
#[utoipa::path(
    post,
    path = "/authentication/password-change",
    request_body = PasswordChangeRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "New password rejected"),
        (status = 401, description = "Current password incorrect"),
    ),
    security(("bearer_auth" = []), ("session_cookie" = [])),
    tag = "authentication"
)]
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<PasswordChangeRequest>,
) -> Result<StatusCode> {
    validate_password(&request.new_password, &state.config)?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let stored = Users::new(&mut pool_conn)
        .get_by_id(user.id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: user.id.to_string(),
        })?;

    let hash = stored.password_hash.ok_or_else(|| Error::BadRequest {
        message: "This account does not use password login".to_string(),
    })?;

    if !verify_password(request.current_password, hash).await? {
        return Err(Error::Unauthenticated {
            message: Some("Current password is incorrect".to_string()),
        });
    }

    let new_hash = hash_password(request.new_password, &state.config).await?;
    Users::new(&mut pool_conn)
        .update(
            user.id,
            &UserUpdateDBRequest {
                password_hash: Some(new_hash),
                ..Default::default()
            },
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
