//! Anti-forgery synchronizer tokens.
//!
//! The browser holds a random anti-forgery session id in an HttpOnly cookie.
//! A sync token is `nonce.HMAC(key, session || nonce)`, so any number of
//! tokens can be handed out for one session and each verifies without
//! server-side state. Clients send it back in the `X-CSRF-Token` header
//! (`XSRF-Token` is accepted too) on every state-changing request.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::Serialize;
use sha2::Sha256;
use tracing::debug;

use crate::auth::{CSRF_COOKIE_NAME, get_cookie};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the sync token.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Accepted alias for [`CSRF_HEADER`].
pub const XSRF_HEADER: &str = "xsrf-token";

const SESSION_ID_BYTES: usize = 32;
const NONCE_BYTES: usize = 16;
const KEY_LABEL: &[u8] = b"tollgate-csrf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CsrfError {
    #[error("Missing anti-forgery token")]
    Missing,
    #[error("Anti-forgery token mismatch")]
    Mismatch,
}

impl CsrfError {
    pub fn code(&self) -> &'static str {
        match self {
            CsrfError::Missing => "csrf_missing",
            CsrfError::Mismatch => "csrf_mismatch",
        }
    }
}

impl IntoResponse for CsrfError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            code: &'static str,
        }

        (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                error: self.to_string(),
                code: self.code(),
            }),
        )
            .into_response()
    }
}

#[derive(Clone)]
pub struct Synchronizer {
    key: [u8; 32],
}

impl Synchronizer {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Derive the synchronizer key from the token signing secret so that the
    /// two never share raw key material.
    pub fn from_jwt_secret(secret: &[u8]) -> Self {
        let mut mac = keyed(secret);
        mac.update(KEY_LABEL);
        let mut key = [0u8; 32];
        key.copy_from_slice(&mac.finalize().into_bytes());
        Self::new(key)
    }

    /// Mint a new anti-forgery session id.
    pub fn new_session_id() -> String {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    fn mac(&self, session: &str, nonce: &[u8]) -> HmacSha256 {
        let mut mac = keyed(&self.key);
        mac.update(&(session.len() as u64).to_be_bytes());
        mac.update(session.as_bytes());
        mac.update(nonce);
        mac
    }

    /// Issue a sync token bound to the session.
    pub fn issue(&self, session: &str) -> String {
        let mut nonce = [0u8; NONCE_BYTES];
        rand::rng().fill_bytes(&mut nonce);
        let tag = self.mac(session, &nonce).finalize().into_bytes();

        format!("{}.{}", URL_SAFE_NO_PAD.encode(nonce), URL_SAFE_NO_PAD.encode(tag))
    }

    /// Check a presented token against the session it should be bound to.
    pub fn validate(&self, session: Option<&str>, presented: Option<&str>) -> Result<(), CsrfError> {
        let presented = presented
            .filter(|t| !t.is_empty())
            .ok_or(CsrfError::Missing)?;
        // A token without a session can never have been issued for it
        let session = session.ok_or(CsrfError::Mismatch)?;

        let (nonce, tag) = presented.split_once('.').ok_or(CsrfError::Mismatch)?;
        let nonce = URL_SAFE_NO_PAD
            .decode(nonce)
            .map_err(|_| CsrfError::Mismatch)?;
        let tag = URL_SAFE_NO_PAD.decode(tag).map_err(|_| CsrfError::Mismatch)?;

        self.mac(session, &nonce)
            .verify_slice(&tag)
            .map_err(|_| CsrfError::Mismatch)
    }
}

fn keyed(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC can take key of any size")
}

/// Read the sync token from the request headers.
pub fn presented_token(headers: &HeaderMap) -> Option<&str> {
    [CSRF_HEADER, XSRF_HEADER]
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
}

fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Middleware rejecting state-changing requests without a valid sync token.
pub async fn require_sync_token(
    State(sync): State<Synchronizer>,
    request: Request,
    next: Next,
) -> Response {
    if is_safe_method(request.method()) {
        return next.run(request).await;
    }

    let headers = request.headers();
    let session = get_cookie(headers, CSRF_COOKIE_NAME);

    match sync.validate(session, presented_token(headers)) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            debug!(path = %request.uri().path(), code = e.code(), "Rejected by anti-forgery check");
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn sync() -> Synchronizer {
        Synchronizer::from_jwt_secret(b"test-secret")
    }

    #[test]
    fn test_issue_and_validate() {
        let sync = sync();
        let session = Synchronizer::new_session_id();

        let token = sync.issue(&session);
        assert_eq!(sync.validate(Some(&session), Some(&token)), Ok(()));

        // Tokens are not reused
        assert_ne!(token, sync.issue(&session));
    }

    #[test]
    fn test_token_bound_to_session() {
        let sync = sync();
        let token = sync.issue("session-a");

        assert_eq!(
            sync.validate(Some("session-b"), Some(&token)),
            Err(CsrfError::Mismatch)
        );
    }

    #[test]
    fn test_missing_and_malformed() {
        let sync = sync();

        assert_eq!(sync.validate(Some("s"), None), Err(CsrfError::Missing));
        assert_eq!(sync.validate(Some("s"), Some("")), Err(CsrfError::Missing));
        assert_eq!(
            sync.validate(Some("s"), Some("no-dot")),
            Err(CsrfError::Mismatch)
        );
        assert_eq!(
            sync.validate(Some("s"), Some("!!.??")),
            Err(CsrfError::Mismatch)
        );

        let token = sync.issue("s");
        assert_eq!(sync.validate(None, Some(&token)), Err(CsrfError::Mismatch));
    }

    #[test]
    fn test_different_key_rejects() {
        let token = sync().issue("s");
        let other = Synchronizer::from_jwt_secret(b"other-secret");

        assert_eq!(other.validate(Some("s"), Some(&token)), Err(CsrfError::Mismatch));
    }

    #[test]
    fn test_presented_token_alias() {
        let mut headers = HeaderMap::new();
        headers.insert(XSRF_HEADER, HeaderValue::from_static("abc"));
        assert_eq!(presented_token(&headers), Some("abc"));

        headers.insert(CSRF_HEADER, HeaderValue::from_static("def"));
        assert_eq!(presented_token(&headers), Some("def"));
    }
}
