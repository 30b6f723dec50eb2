use uuid::Uuid;

use super::schema::Database;
use super::types::{DatabaseError, Feed};

const FEED_COLUMNS: &str = "id, created_at, updated_at, name, url, user_id, last_fetched_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Create a feed owned by `user_id` and follow it on the owner's behalf.
    ///
    /// Both rows are written in one transaction. A URL that is already
    /// registered yields [`DatabaseError::DuplicateKey`].
    pub async fn create_feed(
        &self,
        user_id: Uuid,
        name: &str,
        url: &str,
    ) -> Result<Feed, DatabaseError> {
        let now = super::now();
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let feed = sqlx::query_as::<_, Feed>(&format!(
            "INSERT INTO feeds (id, created_at, updated_at, name, url, user_id)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {FEED_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(name)
        .bind(url)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(DatabaseError::from_insert)?;

        sqlx::query(
            "INSERT INTO feed_follows (id, created_at, updated_at, user_id, feed_id)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(user_id)
        .bind(feed.id)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_insert)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        tracing::info!(feed_id = %feed.id, name = %feed.name, url = %feed.url, "Created feed");
        Ok(feed)
    }

    /// All feeds, alphabetical by name
    pub async fn list_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let feeds = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY name, created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(feeds)
    }

    pub async fn get_feed(&self, feed_id: Uuid) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"
        ))
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(feed)
    }

    /// The `limit` most overdue feeds: never-fetched first, then oldest fetch first.
    ///
    /// Ties are broken by creation time so selection is deterministic.
    pub async fn select_due_feeds(&self, limit: usize) -> Result<Vec<Feed>, DatabaseError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let feeds = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds
             ORDER BY last_fetched_at ASC NULLS FIRST, created_at ASC
             LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(feeds)
    }

    /// Stamp a feed as fetched now and return the updated row.
    ///
    /// Safe to call repeatedly. Unknown ids yield [`DatabaseError::FeedNotFound`].
    pub async fn mark_fetched(&self, feed_id: Uuid) -> Result<Feed, DatabaseError> {
        let now = super::now();
        sqlx::query_as::<_, Feed>(&format!(
            "UPDATE feeds SET last_fetched_at = ?, updated_at = ? WHERE id = ?
             RETURNING {FEED_COLUMNS}"
        ))
        .bind(now)
        .bind(now)
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or(DatabaseError::FeedNotFound(feed_id))
    }
}
