use async_trait::async_trait;
use uuid::Uuid;

use crate::storage::{Database, DatabaseError, Feed, NewPost};

/// The three store operations the ingestion core depends on.
///
/// Implementations must be safe under concurrent use: leases for different
/// feeds and inserts for the same or different feeds arrive in parallel, and
/// the core adds no locking of its own.
#[async_trait]
pub trait IngestionStore: Send + Sync {
    /// Up to `limit` feeds, never-fetched first, then least recently fetched.
    async fn select_due_feeds(&self, limit: usize) -> Result<Vec<Feed>, DatabaseError>;

    /// Set the feed's last-fetched time to now.
    async fn mark_fetched(&self, feed_id: Uuid) -> Result<Feed, DatabaseError>;

    /// Insert a post, failing with [`DatabaseError::DuplicateKey`] if the
    /// `(feed_id, url)` pair is already stored.
    async fn insert_post(&self, post: &NewPost) -> Result<(), DatabaseError>;
}

#[async_trait]
impl IngestionStore for Database {
    async fn select_due_feeds(&self, limit: usize) -> Result<Vec<Feed>, DatabaseError> {
        Database::select_due_feeds(self, limit).await
    }

    async fn mark_fetched(&self, feed_id: Uuid) -> Result<Feed, DatabaseError> {
        Database::mark_fetched(self, feed_id).await
    }

    async fn insert_post(&self, post: &NewPost) -> Result<(), DatabaseError> {
        Database::insert_post(self, post).await
    }
}
