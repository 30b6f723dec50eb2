use uuid::Uuid;

use super::schema::Database;
use super::types::{DatabaseError, NewPost, Post};

/// Default page size for a user's post listing
pub const DEFAULT_POST_LIMIT: usize = 100;

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert one post.
    ///
    /// Never checks for an existing row first: the `UNIQUE(feed_id, url)`
    /// constraint rejects repeats, surfaced as [`DatabaseError::DuplicateKey`].
    pub async fn insert_post(&self, post: &NewPost) -> Result<(), DatabaseError> {
        let now = super::now();
        sqlx::query(
            r#"
            INSERT INTO posts (id, created_at, updated_at, title, description, published_at, url, feed_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(&post.title)
        .bind(&post.description)
        .bind(post.published_at)
        .bind(&post.url)
        .bind(post.feed_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_insert)?;
        Ok(())
    }

    /// Posts of one feed, newest publication first (undated posts last)
    pub async fn get_posts_for_feed(&self, feed_id: Uuid) -> Result<Vec<Post>, DatabaseError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, created_at, updated_at, title, description, published_at, url, feed_id
            FROM posts
            WHERE feed_id = ?
            ORDER BY published_at DESC NULLS LAST, created_at DESC
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(posts)
    }

    /// Posts from every feed the user follows, newest publication first
    pub async fn get_posts_for_user(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Post>, DatabaseError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT p.id, p.created_at, p.updated_at, p.title, p.description,
                   p.published_at, p.url, p.feed_id
            FROM posts p
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at DESC NULLS LAST, p.created_at DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(posts)
    }
}
