//! Refresh credential storage.
//!
//! Only a salted hash of each refresh secret is stored, keyed by the user UUID.
//! The primary key enforces a single live credential per user: issuing again
//! overwrites the previous record.

use sqlx::sqlite::SqlitePool;

/// A stored refresh credential. Timestamps are Unix seconds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshCredential {
    pub user_uuid: String,
    pub credential_hash: String,
    pub expires_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// SQLite stores integers as i64; out-of-range timestamps are an encode error.
fn timestamp(secs: u64) -> Result<i64, sqlx::Error> {
    i64::try_from(secs).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// Store for managing refresh credentials.
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace the credential for a user.
    pub async fn upsert(
        &self,
        user_uuid: &str,
        credential_hash: &str,
        expires_at: u64,
        now: u64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO refresh_credentials (user_uuid, credential_hash, expires_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_uuid) DO UPDATE SET
                credential_hash = excluded.credential_hash,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
        )
        .bind(user_uuid)
        .bind(credential_hash)
        .bind(timestamp(expires_at)?)
        .bind(timestamp(now)?)
        .bind(timestamp(now)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get the credential for a user if it has not expired at `now`.
    pub async fn get_live(
        &self,
        user_uuid: &str,
        now: u64,
    ) -> Result<Option<RefreshCredential>, sqlx::Error> {
        sqlx::query_as(
            "SELECT user_uuid, credential_hash, expires_at, created_at, updated_at
             FROM refresh_credentials WHERE user_uuid = ? AND expires_at > ?",
        )
        .bind(user_uuid)
        .bind(timestamp(now)?)
        .fetch_optional(&self.pool)
        .await
    }

    /// Rotate the credential, only if the stored hash is still `expected_hash`.
    /// Returns false when another writer replaced or deleted it first.
    pub async fn replace_if_hash(
        &self,
        user_uuid: &str,
        expected_hash: &str,
        new_hash: &str,
        expires_at: u64,
        now: u64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE refresh_credentials SET credential_hash = ?, expires_at = ?, updated_at = ?
             WHERE user_uuid = ? AND credential_hash = ?",
        )
        .bind(new_hash)
        .bind(timestamp(expires_at)?)
        .bind(timestamp(now)?)
        .bind(user_uuid)
        .bind(expected_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete the credential only if it still holds `expected_hash`.
    pub async fn delete_if_hash(
        &self,
        user_uuid: &str,
        expected_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM refresh_credentials WHERE user_uuid = ? AND credential_hash = ?",
        )
        .bind(user_uuid)
        .bind(expected_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all credentials expired at `now`.
    pub async fn delete_expired(&self, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_credentials WHERE expires_at <= ?")
            .bind(timestamp(now)?)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Number of stored records for a user (0 or 1).
    pub async fn count_for(&self, user_uuid: &str) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM refresh_credentials WHERE user_uuid = ?")
                .bind(user_uuid)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
