//! Credential lifecycle: issue, refresh, revoke.
//!
//! Dual-token system: short-lived bearer tokens (5 min, stateless JWT) and a
//! long-lived refresh secret (7 days, stored as an argon2 hash). Each
//! principal has at most one live refresh credential.

mod error;
mod issuer;
mod locks;
mod refresh;

use std::sync::Arc;

pub use error::SessionError;
pub use issuer::{IssuedTokens, REFRESH_CREDENTIAL_DURATION_SECS, TokenIssuer, generate_refresh_secret};
pub use locks::PrincipalLocks;
pub use refresh::RefreshProtocol;

use crate::db::Database;
use crate::hasher::SecretHasher;
use crate::jwt::{JwtConfig, now_secs};

/// Entry point used by the HTTP layer.
#[derive(Clone)]
pub struct Sessions {
    jwt: Arc<JwtConfig>,
    issuer: TokenIssuer,
    protocol: RefreshProtocol,
}

impl Sessions {
    pub fn new(
        jwt: Arc<JwtConfig>,
        db: Database,
        hasher: SecretHasher,
        refresh_duration: u64,
    ) -> Self {
        let issuer = TokenIssuer::new(jwt.clone(), db.clone(), hasher.clone(), refresh_duration);
        let protocol = RefreshProtocol::new(issuer.clone(), db, hasher);
        Self {
            jwt,
            issuer,
            protocol,
        }
    }

    pub fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    /// Start a session for a principal (login).
    pub async fn issue(&self, principal: &str) -> Result<IssuedTokens, SessionError> {
        self.issuer.issue_at(principal, now_secs()?).await
    }

    /// Rotate the refresh credential.
    pub async fn refresh(
        &self,
        principal: &str,
        presented: &str,
    ) -> Result<IssuedTokens, SessionError> {
        self.protocol
            .refresh_at(principal, presented, now_secs()?)
            .await
    }

    /// End the session if the presented secret is the live one (logout).
    pub async fn revoke(&self, principal: &str, presented: &str) -> Result<bool, SessionError> {
        self.protocol
            .revoke_at(principal, presented, now_secs()?)
            .await
    }
}
