use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the SQLite write lock for longer than the busy timeout
    #[error("Database is locked by another process. Close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A uniqueness constraint rejected the write (e.g. a post already stored for a feed)
    #[error("Duplicate key")]
    DuplicateKey,

    /// No feed exists with the given id
    #[error("Feed not found: {0}")]
    FeedNotFound(Uuid),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error, separating lock contention from other failures
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }

    /// Classify a failed INSERT, surfacing unique violations as [`DatabaseError::DuplicateKey`].
    pub(crate) fn from_insert(err: sqlx::Error) -> Self {
        let is_unique = err
            .as_database_error()
            .map(|db_err| db_err.is_unique_violation())
            .unwrap_or(false);
        if is_unique {
            DatabaseError::DuplicateKey
        } else {
            Self::from_sqlx(err)
        }
    }

    /// True when the store rejected a write because the row already exists.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DatabaseError::DuplicateKey)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A registered account. Owns the feeds it creates and follows any number of feeds.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
    pub name: String,
    pub api_key: String,
}

/// A subscribed remote feed.
///
/// `last_fetched_at` is `None` until the scheduler leases the feed for the
/// first time; after that it only moves forward.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Feed {
    pub id: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
    pub name: String,
    pub url: String,
    pub user_id: Uuid,
    pub last_fetched_at: Option<i64>,
}

/// A user's subscription to a feed
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FeedFollow {
    pub id: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
    pub user_id: Uuid,
    pub feed_id: Uuid,
}

/// One ingested feed item
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
    pub title: String,
    pub description: Option<String>,
    /// Unix seconds; `None` when the source date could not be parsed
    pub published_at: Option<i64>,
    pub url: String,
    pub feed_id: Uuid,
}

/// Insert payload for a post. `(feed_id, url)` is the dedup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub feed_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub url: String,
}
