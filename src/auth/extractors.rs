//! Axum extractors for authentication.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::cookie::{ACCESS_COOKIE_NAME, get_cookie};
use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;

/// Extractor for API endpoints that require a valid bearer token.
///
/// Purely stateless: the signature and expiry are checked, nothing is looked
/// up. An expired bearer yields 401 `expired` and keeps the cookies so the
/// client can refresh.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = get_cookie(&parts.headers, ACCESS_COOKIE_NAME)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiAuthError::new(AuthErrorKind::NoCredential).keep_cookies())?;

        let claims = state.sessions().jwt().verify(token)?;

        Ok(Auth(AuthenticatedUser {
            principal: claims.sub.clone(),
            claims,
        }))
    }
}
