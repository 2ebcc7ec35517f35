//! Bearer token generation and validation.
//!
//! Bearer tokens are short-lived, stateless HS256 JWTs. Expiry is checked by
//! hand after the signature so that an expired token is reported as
//! [`VerifyError::Expired`] and never confused with a tampered one.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Bearer token duration: 5 minutes
pub const BEARER_TOKEN_DURATION_SECS: u64 = 5 * 60;

/// JWT claims carried by a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerClaims {
    /// Subject (principal, the user UUID)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Result of generating a bearer token.
#[derive(Debug, Clone)]
pub struct BearerTokenResult {
    /// The JWT token string
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    bearer_duration: u64,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            bearer_duration: BEARER_TOKEN_DURATION_SECS,
        }
    }

    /// Override the bearer token lifetime.
    pub fn with_bearer_duration(mut self, secs: u64) -> Self {
        self.bearer_duration = secs;
        self
    }

    pub fn bearer_duration(&self) -> u64 {
        self.bearer_duration
    }

    /// Generate a bearer token as if issued at `now`.
    pub fn issue_bearer_at(
        &self,
        principal: &str,
        now: u64,
    ) -> Result<BearerTokenResult, JwtError> {
        let exp = now
            .checked_add(self.bearer_duration)
            .ok_or(JwtError::ExpiryOverflow)?;

        let claims = BearerClaims {
            sub: principal.to_string(),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(BearerTokenResult {
            token,
            expires_at: exp,
            duration: self.bearer_duration,
        })
    }

    /// Verify a bearer token against the current time.
    pub fn verify(&self, token: &str) -> Result<BearerClaims, VerifyError> {
        let now = now_secs().map_err(|_| VerifyError::Invalid)?;
        self.verify_at(token, now)
    }

    /// Verify a bearer token against the given time.
    pub fn verify_at(&self, token: &str, now: u64) -> Result<BearerClaims, VerifyError> {
        let claims = self.decode_ignoring_expiry(token)?;

        if now >= claims.exp {
            return Err(VerifyError::Expired);
        }

        Ok(claims)
    }

    /// Check structure and signature only.
    ///
    /// Used to recover the principal from an expired bearer token during
    /// refresh and logout. The expiry claim must still be present.
    pub fn decode_ignoring_expiry(&self, token: &str) -> Result<BearerClaims, VerifyError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;

        let token_data =
            jsonwebtoken::decode::<BearerClaims>(token, &self.decoding_key, &validation)
                .map_err(|_| VerifyError::Invalid)?;

        if token_data.claims.sub.is_empty() {
            return Err(VerifyError::Invalid);
        }

        Ok(token_data.claims)
    }
}

/// Current Unix time in seconds.
pub fn now_secs() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Errors that can occur while creating tokens.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("System time error")]
    TimeError,
    #[error("Token expiry out of range")]
    ExpiryOverflow,
}

/// Why a presented bearer token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Signature and structure are fine but the token is past its expiry.
    #[error("Access token expired")]
    Expired,
    /// Malformed, tampered, or signed with another key.
    #[error("Invalid token")]
    Invalid,
}
