//! User API endpoints.
//!
//! - POST `/register` - Create an account
//! - POST `/login` - Check the password and start a session
//! - GET `/profile` - Current user's profile
//! - PUT `/profile` - Change the display name

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    middleware,
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use super::error::{ApiError, PASSWORD_MIN_CHARS, ResultExt, validate_email, validate_name};
use crate::auth::{
    ApiAuthError, Auth, AuthErrorKind, CSRF_COOKIE_NAME, build_cookie, token_cookies,
};
use crate::csrf::Synchronizer;
use crate::db::{Database, UserProfile, is_unique_violation};
use crate::hasher::SecretHasher;
use crate::impl_has_auth_backend;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};
use crate::session::{SessionError, Sessions};

/// Compared against when the email is unknown, so both paths cost one hash.
const DUMMY_PASSWORD: &str = "tollgate-dummy-password";

fn hash_error(context: &'static str, e: impl std::fmt::Display) -> ApiError {
    error!(error = %e, "{}", context);
    ApiError::internal(context)
}

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub sessions: Sessions,
    pub hasher: SecretHasher,
    pub sync: Synchronizer,
    pub secure_cookies: bool,
    pub rate_limit_config: Option<Arc<RateLimitConfig>>,
    pub dummy_hash: Arc<OnceCell<String>>,
}

impl_has_auth_backend!(UsersState);

/// Routes that never carry an anti-forgery token.
pub fn public_router(state: UsersState) -> Router {
    let login = Router::new()
        .route("/login", post(login))
        .with_state(state.clone());
    let register = Router::new()
        .route("/register", post(register))
        .with_state(state.clone());

    match state.rate_limit_config {
        Some(config) => Router::new()
            .merge(login.layer(middleware::from_fn_with_state(
                config.clone(),
                rate_limit_login,
            )))
            .merge(register.layer(middleware::from_fn_with_state(
                config,
                rate_limit_register,
            ))),
        None => Router::new().merge(login).merge(register),
    }
}

/// Routes behind the anti-forgery check.
pub fn guarded_router(state: UsersState) -> Router {
    Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .with_state(state)
}

#[derive(Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
    password: String,
}

#[derive(Serialize)]
struct UserResponse {
    success: bool,
    message: &'static str,
    user: UserProfile,
}

async fn register(
    State(state): State<UsersState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validate_name(&payload.name)?;
    let email = validate_email(&payload.email)?;

    if payload.password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_CHARS
        )));
    }

    let password_hash = state
        .hasher
        .hash_blocking(payload.password)
        .await
        .map_err(|e| hash_error("Failed to hash password", e))?;

    let uuid = uuid::Uuid::new_v4().to_string();

    match state
        .db
        .users()
        .create(&uuid, name, email, &password_hash)
        .await
    {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::conflict("User already exists"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    }

    let user = state
        .db
        .users()
        .get_profile(&uuid)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::internal("User vanished after creation"))?;

    info!(user = %uuid, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            success: true,
            message: "User registered successfully",
            user,
        }),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    success: bool,
    message: &'static str,
    user: UserProfile,
    #[serde(rename = "syncToken")]
    sync_token: String,
}

async fn login(
    State(state): State<UsersState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&payload.email)?;
    if payload.password.is_empty() {
        return Err(ApiError::bad_request("Password is required"));
    }

    let user = state
        .db
        .users()
        .get_by_email(email)
        .await
        .db_err("Failed to get user")?;

    let stored_hash = match &user {
        Some(user) => user.password_hash.clone(),
        None => state
            .dummy_hash
            .get_or_try_init(|| state.hasher.hash_blocking(DUMMY_PASSWORD.to_string()))
            .await
            .map_err(|e| hash_error("Failed to hash password", e))?
            .clone(),
    };

    let valid = state
        .hasher
        .verify_blocking(payload.password, stored_hash)
        .await
        .map_err(|e| hash_error("Failed to verify password", e))?;

    let user = match user {
        Some(user) if valid => user,
        _ => {
            warn!("Failed login attempt");
            return Err(ApiError::unauthorized("Incorrect email or password"));
        }
    };

    let tokens = state.sessions.issue(&user.uuid).await?;

    // Fresh anti-forgery session for the new login
    let csrf_session = Synchronizer::new_session_id();
    let sync_token = state.sync.issue(&csrf_session);

    let [access_cookie, refresh_cookie] = token_cookies(&tokens, state.secure_cookies);
    let csrf_cookie = build_cookie(CSRF_COOKIE_NAME, &csrf_session, None, state.secure_cookies);

    info!(user = %user.uuid, "Login successful");

    Ok((
        StatusCode::OK,
        AppendHeaders([
            (SET_COOKIE, access_cookie),
            (SET_COOKIE, refresh_cookie),
            (SET_COOKIE, csrf_cookie),
        ]),
        Json(LoginResponse {
            success: true,
            message: "Login successful",
            user: user.profile(),
            sync_token,
        }),
    ))
}

#[derive(Serialize)]
struct ProfileResponse {
    success: bool,
    user: UserProfile,
}

async fn get_profile(
    State(state): State<UsersState>,
    Auth(auth): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_profile(&auth.principal)
        .await
        .map_err(SessionError::from)?
        .ok_or_else(|| ApiAuthError::new(AuthErrorKind::PrincipalMissing))?;

    Ok(Json(ProfileResponse {
        success: true,
        user,
    }))
}

#[derive(Deserialize)]
struct UpdateProfileRequest {
    name: String,
}

async fn update_profile(
    State(state): State<UsersState>,
    Auth(auth): Auth,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validate_name(&payload.name)?;

    let updated = state
        .db
        .users()
        .update_name(&auth.principal, name)
        .await
        .db_err("Failed to update profile")?;

    if !updated {
        return Err(ApiAuthError::new(AuthErrorKind::PrincipalMissing).into());
    }

    let user = state
        .db
        .users()
        .get_profile(&auth.principal)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiAuthError::new(AuthErrorKind::PrincipalMissing))?;

    info!(user = %auth.principal, "Profile updated");

    Ok(Json(UserResponse {
        success: true,
        message: "Profile updated",
        user,
    }))
}
