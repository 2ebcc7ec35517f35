//! Dual-token issuance.
//!
//! A bearer token (stateless JWT) plus an opaque refresh secret. Only the
//! argon2 hash of the secret is stored; the clear secret leaves this module
//! exactly once, inside [`IssuedTokens`].
//!
//! Every write to a principal's stored credential happens under that
//! principal's lock, which the issuer owns and shares with the refresh
//! protocol.

use std::sync::Arc;

use rand::RngCore;
use tracing::debug;

use super::error::SessionError;
use super::locks::PrincipalLocks;
use crate::db::Database;
use crate::hasher::SecretHasher;
use crate::jwt::{BearerTokenResult, JwtConfig};

/// Refresh credential duration: 7 days
pub const REFRESH_CREDENTIAL_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Refresh secret length in bytes (256 bits).
const REFRESH_SECRET_BYTES: usize = 32;

/// Tokens handed to the client after login or refresh.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub bearer: BearerTokenResult,
    /// Hex-encoded refresh secret, in clear.
    pub refresh_secret: String,
    /// Refresh credential expiration (Unix seconds)
    pub refresh_expires_at: u64,
    /// Refresh credential duration in seconds
    pub refresh_duration: u64,
}

/// Generate a fresh refresh secret from the thread-local CSPRNG.
pub fn generate_refresh_secret() -> String {
    let mut bytes = [0u8; REFRESH_SECRET_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Clone)]
pub struct TokenIssuer {
    jwt: Arc<JwtConfig>,
    db: Database,
    hasher: SecretHasher,
    refresh_duration: u64,
    locks: Arc<PrincipalLocks>,
}

impl TokenIssuer {
    pub fn new(
        jwt: Arc<JwtConfig>,
        db: Database,
        hasher: SecretHasher,
        refresh_duration: u64,
    ) -> Self {
        Self {
            jwt,
            db,
            hasher,
            refresh_duration,
            locks: Arc::new(PrincipalLocks::new()),
        }
    }

    /// Locks serializing credential writes per principal.
    pub fn locks(&self) -> &PrincipalLocks {
        &self.locks
    }

    /// Create both tokens and the hash to store, without touching the store.
    async fn mint(&self, principal: &str, now: u64) -> Result<(IssuedTokens, String), SessionError> {
        let refresh_expires_at = now
            .checked_add(self.refresh_duration)
            .filter(|&t| t <= i64::MAX as u64)
            .ok_or_else(|| SessionError::Internal("Refresh expiry out of range".into()))?;
        let bearer = self.jwt.issue_bearer_at(principal, now)?;
        let refresh_secret = generate_refresh_secret();
        let hash = self.hasher.hash_blocking(refresh_secret.clone()).await?;

        let tokens = IssuedTokens {
            bearer,
            refresh_secret,
            refresh_expires_at,
            refresh_duration: self.refresh_duration,
        };
        Ok((tokens, hash))
    }

    /// Issue tokens for a principal, replacing any stored credential.
    pub async fn issue_at(&self, principal: &str, now: u64) -> Result<IssuedTokens, SessionError> {
        let (tokens, hash) = self.mint(principal, now).await?;

        let lock = self.locks.get(principal);
        let _held = lock.lock().await;

        self.db
            .credentials()
            .upsert(principal, &hash, tokens.refresh_expires_at, now)
            .await?;

        debug!(user = %principal, "Issued refresh credential");
        Ok(tokens)
    }

    /// Issue tokens, overwriting the stored credential only if it still
    /// holds `expected_hash`. Returns `None` when the record changed underneath.
    ///
    /// The caller must hold the principal's lock from [`TokenIssuer::locks`].
    pub async fn rotate_at(
        &self,
        principal: &str,
        expected_hash: &str,
        now: u64,
    ) -> Result<Option<IssuedTokens>, SessionError> {
        let (tokens, hash) = self.mint(principal, now).await?;

        let replaced = self
            .db
            .credentials()
            .replace_if_hash(principal, expected_hash, &hash, tokens.refresh_expires_at, now)
            .await?;

        Ok(replaced.then_some(tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::HashCost;

    async fn issuer() -> (TokenIssuer, Database) {
        let db = Database::open(":memory:").await.unwrap();
        let jwt = Arc::new(JwtConfig::new(b"test-secret"));
        let hasher = SecretHasher::new(HashCost::minimal()).unwrap();
        (
            TokenIssuer::new(jwt, db.clone(), hasher, REFRESH_CREDENTIAL_DURATION_SECS),
            db,
        )
    }

    #[test]
    fn test_refresh_secret_shape() {
        let a = generate_refresh_secret();
        let b = generate_refresh_secret();

        assert_eq!(a.len(), REFRESH_SECRET_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_issue_stores_hash_not_secret() {
        let (issuer, db) = issuer().await;

        let tokens = issuer.issue_at("uuid-1", 1_000).await.unwrap();
        assert_eq!(
            tokens.refresh_expires_at,
            1_000 + REFRESH_CREDENTIAL_DURATION_SECS
        );

        let record = db
            .credentials()
            .get_live("uuid-1", 1_000)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(record.credential_hash, tokens.refresh_secret);
        assert!(record.credential_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_issue_twice_keeps_single_record() {
        let (issuer, db) = issuer().await;

        let first = issuer.issue_at("uuid-1", 1_000).await.unwrap();
        let second = issuer.issue_at("uuid-1", 1_001).await.unwrap();

        assert_ne!(first.refresh_secret, second.refresh_secret);
        assert_eq!(db.credentials().count_for("uuid-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rotate_loses_on_stale_hash() {
        let (issuer, db) = issuer().await;

        issuer.issue_at("uuid-1", 1_000).await.unwrap();
        let rotated = issuer.rotate_at("uuid-1", "stale", 1_001).await.unwrap();

        assert!(rotated.is_none());
        assert_eq!(db.credentials().count_for("uuid-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expiry_out_of_range() {
        let db = Database::open(":memory:").await.unwrap();
        let jwt = Arc::new(JwtConfig::new(b"test-secret"));
        let hasher = SecretHasher::new(HashCost::minimal()).unwrap();
        let issuer = TokenIssuer::new(jwt, db.clone(), hasher, u64::MAX);

        let result = issuer.issue_at("uuid-1", 1_000).await;
        assert!(matches!(result, Err(SessionError::Internal(_))));
        assert_eq!(db.credentials().count_for("uuid-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_issue_with_closed_store() {
        let (issuer, db) = issuer().await;
        db.close().await;

        let result = issuer.issue_at("uuid-1", 1_000).await;
        assert!(matches!(result, Err(SessionError::StoreUnavailable(_))));
    }
}
