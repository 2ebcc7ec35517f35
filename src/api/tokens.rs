//! Session token endpoints.
//!
//! - POST `/refresh` - Exchange the refresh secret for a new token pair
//! - POST `/logout` - Clear cookies and revoke the refresh secret
//! - GET `/sync-token` - Anti-forgery token for the current session

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::{
    ACCESS_COOKIE_NAME, ApiAuthError, AuthErrorKind, CSRF_COOKIE_NAME, REFRESH_COOKIE_NAME,
    build_cookie, cleared_token_cookies, get_cookie, token_cookies,
};
use crate::csrf::Synchronizer;
use crate::session::Sessions;

#[derive(Clone)]
pub struct TokensState {
    pub sessions: Sessions,
    pub sync: Synchronizer,
    pub secure_cookies: bool,
}

/// Routes that never carry an anti-forgery token.
pub fn public_router(state: TokensState) -> Router {
    Router::new()
        .route("/refresh", post(refresh))
        .route("/sync-token", get(sync_token))
        .with_state(state)
}

/// Routes behind the anti-forgery check.
pub fn guarded_router(state: TokensState) -> Router {
    Router::new()
        .route("/logout", post(logout))
        .with_state(state)
}

fn non_empty_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    get_cookie(headers, name).filter(|v| !v.is_empty())
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
    message: &'static str,
}

/// Rotate the refresh credential.
///
/// The principal comes from the bearer cookie, whose signature must hold
/// even though it has usually expired. Every auth failure clears the cookies.
async fn refresh(State(state): State<TokensState>, headers: HeaderMap) -> Response {
    match refresh_inner(&state, &headers).await {
        Ok(response) => response,
        Err(e) => e.clear_on_auth_failure().into_response(),
    }
}

async fn refresh_inner(state: &TokensState, headers: &HeaderMap) -> Result<Response, ApiAuthError> {
    let secret = non_empty_cookie(headers, REFRESH_COOKIE_NAME)
        .ok_or_else(|| ApiAuthError::new(AuthErrorKind::NoCredential))?;
    let bearer = non_empty_cookie(headers, ACCESS_COOKIE_NAME)
        .ok_or_else(|| ApiAuthError::new(AuthErrorKind::NoCredential))?;

    let claims = state.sessions.jwt().decode_ignoring_expiry(bearer)?;
    let tokens = state.sessions.refresh(&claims.sub, secret).await?;

    let [access_cookie, refresh_cookie] = token_cookies(&tokens, state.secure_cookies);

    debug!(user = %claims.sub, "Refreshed tokens");

    Ok((
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, access_cookie), (SET_COOKIE, refresh_cookie)]),
        Json(SuccessResponse {
            success: true,
            message: "Token refreshed",
        }),
    )
        .into_response())
}

/// Logout - clear both cookies, then revoke the refresh credential if it is
/// still the live one. Never fails.
async fn logout(State(state): State<TokensState>, headers: HeaderMap) -> impl IntoResponse {
    let principal = non_empty_cookie(&headers, ACCESS_COOKIE_NAME)
        .and_then(|bearer| state.sessions.jwt().decode_ignoring_expiry(bearer).ok())
        .map(|claims| claims.sub);
    let secret = non_empty_cookie(&headers, REFRESH_COOKIE_NAME);

    if let (Some(principal), Some(secret)) = (principal, secret) {
        match state.sessions.revoke(&principal, secret).await {
            Ok(true) => info!(user = %principal, "Logged out, refresh credential revoked"),
            Ok(false) => debug!(user = %principal, "Logged out, nothing to revoke"),
            Err(e) => warn!(user = %principal, error = %e, "Failed to revoke on logout"),
        }
    }

    let [clear_access, clear_refresh] = cleared_token_cookies(state.secure_cookies);

    (
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, clear_access), (SET_COOKIE, clear_refresh)]),
        Json(SuccessResponse {
            success: true,
            message: "Logged out",
        }),
    )
}

#[derive(Serialize)]
struct SyncTokenResponse {
    #[serde(rename = "syncToken")]
    sync_token: String,
}

/// Issue a sync token for the current anti-forgery session, starting one if
/// the browser has none.
async fn sync_token(State(state): State<TokensState>, headers: HeaderMap) -> Response {
    match non_empty_cookie(&headers, CSRF_COOKIE_NAME) {
        Some(session) => Json(SyncTokenResponse {
            sync_token: state.sync.issue(session),
        })
        .into_response(),
        None => {
            let session = Synchronizer::new_session_id();
            let cookie = build_cookie(CSRF_COOKIE_NAME, &session, None, state.secure_cookies);
            (
                AppendHeaders([(SET_COOKIE, cookie)]),
                Json(SyncTokenResponse {
                    sync_token: state.sync.issue(&session),
                }),
            )
                .into_response()
        }
    }
}
