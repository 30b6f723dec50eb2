mod feeds;
mod follows;
mod posts;
mod schema;
mod types;
mod users;

pub use posts::DEFAULT_POST_LIMIT;
pub use schema::Database;
pub use types::{DatabaseError, Feed, FeedFollow, NewPost, Post, User};

/// Current wall-clock time as unix seconds, the unit every timestamp column uses
pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
