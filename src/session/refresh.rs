//! Refresh credential rotation with replay detection.
//!
//! Every read-compare-overwrite runs under the principal's lock, shared with
//! login, and the overwrite itself is a compare-and-swap on the stored hash.
//! A secret that fails to match revokes the stored credential: whoever
//! presented it is either replaying a rotated secret or guessing. Revocation
//! only ever deletes the record that was read.

use tracing::{info, warn};

use super::error::SessionError;
use super::issuer::{IssuedTokens, TokenIssuer};
use crate::db::Database;
use crate::hasher::SecretHasher;

#[derive(Clone)]
pub struct RefreshProtocol {
    issuer: TokenIssuer,
    db: Database,
    hasher: SecretHasher,
}

impl RefreshProtocol {
    pub fn new(issuer: TokenIssuer, db: Database, hasher: SecretHasher) -> Self {
        Self {
            issuer,
            db,
            hasher,
        }
    }

    /// Exchange a presented refresh secret for a fresh token pair.
    pub async fn refresh_at(
        &self,
        principal: &str,
        presented: &str,
        now: u64,
    ) -> Result<IssuedTokens, SessionError> {
        let lock = self.issuer.locks().get(principal);
        let _held = lock.lock().await;

        let record = self
            .db
            .credentials()
            .get_live(principal, now)
            .await?
            .ok_or(SessionError::NoCredential)?;

        let matches = self
            .hasher
            .verify_blocking(presented.to_string(), record.credential_hash.clone())
            .await?;

        if !matches {
            self.revoke_record(principal, &record.credential_hash).await?;
            warn!(user = %principal, "Refresh secret mismatch, credential revoked");
            return Err(SessionError::Mismatch);
        }

        if self.db.users().get_by_uuid(principal).await?.is_none() {
            self.revoke_record(principal, &record.credential_hash).await?;
            warn!(user = %principal, "Refresh for missing principal");
            return Err(SessionError::PrincipalMissing);
        }

        match self
            .issuer
            .rotate_at(principal, &record.credential_hash, now)
            .await?
        {
            Some(tokens) => {
                info!(user = %principal, "Refresh credential rotated");
                Ok(tokens)
            }
            None => {
                // Another process wrote between our read and write; its record stays
                warn!(user = %principal, "Concurrent credential write detected");
                Err(SessionError::Mismatch)
            }
        }
    }

    /// Delete the record that was read, never one written since.
    async fn revoke_record(&self, principal: &str, hash: &str) -> Result<(), SessionError> {
        self.db.credentials().delete_if_hash(principal, hash).await?;
        Ok(())
    }

    /// Delete the stored credential if it matches the presented secret.
    /// Returns whether anything was revoked.
    pub async fn revoke_at(
        &self,
        principal: &str,
        presented: &str,
        now: u64,
    ) -> Result<bool, SessionError> {
        let lock = self.issuer.locks().get(principal);
        let _held = lock.lock().await;

        let Some(record) = self.db.credentials().get_live(principal, now).await? else {
            return Ok(false);
        };

        let matches = self
            .hasher
            .verify_blocking(presented.to_string(), record.credential_hash.clone())
            .await?;

        if !matches {
            return Ok(false);
        }

        Ok(self
            .db
            .credentials()
            .delete_if_hash(principal, &record.credential_hash)
            .await?)
    }
}
