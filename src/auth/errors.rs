//! Authentication error types.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use super::cookie::cleared_token_cookies;
use crate::jwt::VerifyError;
use crate::server_config;
use crate::session::SessionError;

/// Why a request could not be authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// Bearer signature or structure is bad.
    Invalid,
    /// Bearer is past its expiry; the client should refresh.
    Expired,
    /// No credential was presented, or none is stored.
    NoCredential,
    /// Presented refresh secret did not match; the stored one is revoked.
    Mismatch,
    PrincipalMissing,
    StoreUnavailable,
    Internal,
}

impl AuthErrorKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthErrorKind::Expired
            | AuthErrorKind::NoCredential
            | AuthErrorKind::PrincipalMissing => StatusCode::UNAUTHORIZED,
            AuthErrorKind::Invalid | AuthErrorKind::Mismatch => StatusCode::FORBIDDEN,
            AuthErrorKind::StoreUnavailable | AuthErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable code carried in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AuthErrorKind::Invalid => "invalid",
            AuthErrorKind::Expired => "expired",
            AuthErrorKind::NoCredential => "no_credential",
            AuthErrorKind::Mismatch => "mismatch",
            AuthErrorKind::PrincipalMissing => "principal_missing",
            AuthErrorKind::StoreUnavailable => "store_unavailable",
            AuthErrorKind::Internal => "internal",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            AuthErrorKind::Invalid => "Invalid token",
            AuthErrorKind::Expired => "Access token expired",
            AuthErrorKind::NoCredential => "Not authenticated",
            AuthErrorKind::Mismatch => "Refresh credential mismatch",
            AuthErrorKind::PrincipalMissing => "User not found",
            AuthErrorKind::StoreUnavailable => "Credential store unavailable",
            AuthErrorKind::Internal => "Internal error",
        }
    }

    /// What the client should do next, if anything.
    fn hint(&self) -> Option<&'static str> {
        match self {
            AuthErrorKind::Expired => Some("refresh"),
            AuthErrorKind::Invalid
            | AuthErrorKind::NoCredential
            | AuthErrorKind::Mismatch
            | AuthErrorKind::PrincipalMissing => Some("login"),
            AuthErrorKind::StoreUnavailable | AuthErrorKind::Internal => None,
        }
    }

    /// Whether this failure ends the session on the client.
    pub fn is_terminal(&self) -> bool {
        matches!(self.hint(), Some("login"))
    }
}

/// API authentication error. Returns JSON and, for terminal kinds, clears the
/// token cookies.
#[derive(Debug)]
pub struct ApiAuthError {
    pub kind: AuthErrorKind,
    clear_cookies: bool,
}

impl ApiAuthError {
    pub fn new(kind: AuthErrorKind) -> Self {
        Self {
            kind,
            clear_cookies: kind.is_terminal(),
        }
    }

    /// Keep the token cookies even for a terminal kind.
    pub fn keep_cookies(mut self) -> Self {
        self.clear_cookies = false;
        self
    }

    /// Clear the token cookies for every auth failure, not just terminal
    /// ones. Store and internal failures still keep them.
    pub fn clear_on_auth_failure(mut self) -> Self {
        self.clear_cookies = !matches!(
            self.kind,
            AuthErrorKind::StoreUnavailable | AuthErrorKind::Internal
        );
        self
    }

    pub fn clears_cookies(&self) -> bool {
        self.clear_cookies
    }
}

impl From<VerifyError> for ApiAuthError {
    fn from(e: VerifyError) -> Self {
        Self::new(match e {
            VerifyError::Expired => AuthErrorKind::Expired,
            VerifyError::Invalid => AuthErrorKind::Invalid,
        })
    }
}

impl From<SessionError> for ApiAuthError {
    fn from(e: SessionError) -> Self {
        let kind = match e {
            SessionError::NoCredential => AuthErrorKind::NoCredential,
            SessionError::Mismatch => AuthErrorKind::Mismatch,
            SessionError::PrincipalMissing => AuthErrorKind::PrincipalMissing,
            SessionError::StoreUnavailable(e) => {
                error!(error = %e, "Credential store unavailable");
                AuthErrorKind::StoreUnavailable
            }
            SessionError::Internal(e) => {
                error!(error = %e, "Session internal error");
                AuthErrorKind::Internal
            }
        };
        Self::new(kind)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        let mut response = (
            self.kind.status_code(),
            Json(ErrorResponse {
                error: self.kind.message(),
                code: self.kind.code(),
                hint: self.kind.hint(),
            }),
        )
            .into_response();

        if self.clear_cookies {
            let headers = response.headers_mut();
            for cookie in cleared_token_cookies(server_config::secure_cookies()) {
                if let Ok(value) = HeaderValue::from_str(&cookie) {
                    headers.append(header::SET_COOKIE, value);
                }
            }
        }

        response
    }
}
