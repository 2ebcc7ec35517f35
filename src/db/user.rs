use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// A registered principal, including the stored password hash.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            uuid: self.uuid.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

/// Public profile. Does not expose internal database IDs or credentials.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct UserProfile {
    pub uuid: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user. Returns the user ID.
    /// Fails with a unique violation when the email is taken (case-insensitive).
    pub async fn create(
        &self,
        uuid: &str,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (uuid, name, email, password_hash) VALUES (?, ?, ?, ?)",
        )
        .bind(uuid)
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a user by email.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, uuid, name, email, password_hash, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    /// Get a user by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, uuid, name, email, password_hash, created_at FROM users WHERE uuid = ?",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await
    }

    /// Get the public profile for a user.
    pub async fn get_profile(&self, uuid: &str) -> Result<Option<UserProfile>, sqlx::Error> {
        sqlx::query_as("SELECT uuid, name, email, created_at FROM users WHERE uuid = ?")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
    }

    /// Change the display name. Returns false if the user does not exist.
    pub async fn update_name(&self, uuid: &str, name: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET name = ? WHERE uuid = ?")
            .bind(name)
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user.
    pub async fn delete(&self, uuid: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE uuid = ?")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Whether a database error is a unique constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_create_and_lookup() {
        let db = Database::open(":memory:").await.unwrap();
        let users = db.users();

        let id = users
            .create("uuid-1", "alice", "alice@example.com", "hash")
            .await
            .unwrap();

        let by_uuid = users.get_by_uuid("uuid-1").await.unwrap().unwrap();
        assert_eq!(by_uuid.id, id);
        assert_eq!(by_uuid.name, "alice");

        // Email lookup ignores case
        let by_email = users
            .get_by_email("ALICE@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.uuid, "uuid-1");
        assert_eq!(by_email.password_hash, "hash");

        assert!(users.get_by_uuid("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_unique_violation() {
        let db = Database::open(":memory:").await.unwrap();
        let users = db.users();

        users
            .create("uuid-1", "alice", "alice@example.com", "hash")
            .await
            .unwrap();
        let err = users
            .create("uuid-2", "alice2", "Alice@Example.com", "hash")
            .await
            .unwrap_err();

        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_profile_and_update_name() {
        let db = Database::open(":memory:").await.unwrap();
        let users = db.users();

        users
            .create("uuid-1", "alice", "alice@example.com", "hash")
            .await
            .unwrap();

        assert!(users.update_name("uuid-1", "alice b").await.unwrap());
        assert!(!users.update_name("missing", "x").await.unwrap());

        let profile = users.get_profile("uuid-1").await.unwrap().unwrap();
        assert_eq!(profile.name, "alice b");
        assert_eq!(profile.email, "alice@example.com");
        assert!(!profile.created_at.is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let db = Database::open(":memory:").await.unwrap();
        let users = db.users();

        users
            .create("uuid-1", "alice", "alice@example.com", "hash")
            .await
            .unwrap();

        assert!(users.delete("uuid-1").await.unwrap());
        assert!(!users.delete("uuid-1").await.unwrap());
        assert!(users.get_by_uuid("uuid-1").await.unwrap().is_none());
    }
}
