use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::schema::Database;
use super::types::{DatabaseError, User};

/// 64 hex chars derived from a fresh random UUID
fn generate_api_key() -> String {
    let seed = Uuid::new_v4();
    format!("{:x}", Sha256::digest(seed.as_bytes()))
}

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user with a freshly generated API key
    pub async fn create_user(&self, name: &str) -> Result<User, DatabaseError> {
        let now = super::now();
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, created_at, updated_at, name, api_key)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, created_at, updated_at, name, api_key
        "#,
        )
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(name)
        .bind(generate_api_key())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_insert)?;

        tracing::info!(user_id = %user.id, name = %user.name, "Created user");
        Ok(user)
    }

    /// Look up the user owning an API key
    pub async fn get_user_by_api_key(&self, api_key: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, created_at, updated_at, name, api_key FROM users WHERE api_key = ?",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(user)
    }
}
