//! Integration tests for the user → feed → follow → post lifecycle.
//!
//! Each test creates its own in-memory SQLite database for isolation.
//! These exercise the storage layer end-to-end the way the CLI composes it.

use feedsync::ingest::IngestionStore;
use feedsync::storage::{Database, NewPost, DEFAULT_POST_LIMIT};
use pretty_assertions::assert_eq;
use uuid::Uuid;

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn test_post(feed_id: Uuid, slug: &str, published_at: Option<i64>) -> NewPost {
    NewPost {
        feed_id,
        title: format!("Post {slug}"),
        description: Some("Summary".to_string()),
        published_at,
        url: format!("https://example.com/{slug}"),
    }
}

// ============================================================================
// Users
// ============================================================================

#[tokio::test]
async fn test_api_key_identifies_user() {
    let db = test_db().await;
    let alice = db.create_user("alice").await.unwrap();
    let bob = db.create_user("bob").await.unwrap();

    assert_ne!(alice.api_key, bob.api_key);
    let found = db.get_user_by_api_key(&bob.api_key).await.unwrap().unwrap();
    assert_eq!(found, bob);
    assert!(db.get_user_by_api_key("not-a-key").await.unwrap().is_none());
}

// ============================================================================
// Follow / unfollow
// ============================================================================

#[tokio::test]
async fn test_follow_shows_posts_unfollow_hides_them() {
    let db = test_db().await;
    let owner = db.create_user("owner").await.unwrap();
    let reader = db.create_user("reader").await.unwrap();
    let feed = db
        .create_feed(owner.id, "Blog", "https://example.com/rss")
        .await
        .unwrap();
    db.insert_post(&test_post(feed.id, "one", Some(1_700_000_000)))
        .await
        .unwrap();

    assert!(db
        .get_posts_for_user(reader.id, DEFAULT_POST_LIMIT)
        .await
        .unwrap()
        .is_empty());

    let follow = db.create_feed_follow(reader.id, feed.id).await.unwrap();
    let posts = db
        .get_posts_for_user(reader.id, DEFAULT_POST_LIMIT)
        .await
        .unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].title, "Post one");

    // Only the owner of the follow can remove it
    assert!(!db.delete_feed_follow(follow.id, owner.id).await.unwrap());
    assert!(db.delete_feed_follow(follow.id, reader.id).await.unwrap());
    assert!(db
        .get_posts_for_user(reader.id, DEFAULT_POST_LIMIT)
        .await
        .unwrap()
        .is_empty());

    // The owner's own follow is unaffected
    assert_eq!(
        db.get_posts_for_user(owner.id, DEFAULT_POST_LIMIT)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_creator_can_list_and_remove_own_follow() {
    let db = test_db().await;
    let owner = db.create_user("owner").await.unwrap();
    let feed = db
        .create_feed(owner.id, "Blog", "https://example.com/rss")
        .await
        .unwrap();

    let follows = db.list_feed_follows(owner.id).await.unwrap();
    assert_eq!(follows.len(), 1);
    assert_eq!(follows[0].feed_id, feed.id);
    assert_eq!(follows[0].user_id, owner.id);

    assert!(db.delete_feed_follow(follows[0].id, owner.id).await.unwrap());
    assert!(db.list_feed_follows(owner.id).await.unwrap().is_empty());

    // The feed itself stays registered
    assert_eq!(db.list_feeds().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_double_follow_is_duplicate() {
    let db = test_db().await;
    let user = db.create_user("u").await.unwrap();
    let feed = db
        .create_feed(user.id, "F", "https://example.com/rss")
        .await
        .unwrap();

    // create_feed already followed it for the owner
    let err = db.create_feed_follow(user.id, feed.id).await.unwrap_err();
    assert!(err.is_duplicate());
}

// ============================================================================
// Ingestion store contract on Database
// ============================================================================

#[tokio::test]
async fn test_database_as_ingestion_store() {
    let db = test_db().await;
    let user = db.create_user("u").await.unwrap();
    let feed = db
        .create_feed(user.id, "F", "https://example.com/rss")
        .await
        .unwrap();
    let store: &dyn IngestionStore = &db;

    let due = store.select_due_feeds(10).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].last_fetched_at, None);

    let leased = store.mark_fetched(feed.id).await.unwrap();
    assert!(leased.last_fetched_at.is_some());

    store
        .insert_post(&test_post(feed.id, "a", None))
        .await
        .unwrap();
    let err = store
        .insert_post(&test_post(feed.id, "a", None))
        .await
        .unwrap_err();
    assert!(err.is_duplicate());
}

#[tokio::test]
async fn test_posts_limit_and_order_across_feeds() {
    let db = test_db().await;
    let user = db.create_user("u").await.unwrap();
    let a = db
        .create_feed(user.id, "A", "https://a.example.com/rss")
        .await
        .unwrap();
    let b = db
        .create_feed(user.id, "B", "https://b.example.com/rss")
        .await
        .unwrap();

    for (i, feed) in [a.id, b.id, a.id, b.id].into_iter().enumerate() {
        db.insert_post(&test_post(feed, &format!("p{i}"), Some(1_000 + i as i64)))
            .await
            .unwrap();
    }

    let titles: Vec<String> = db
        .get_posts_for_user(user.id, 3)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.title)
        .collect();
    assert_eq!(titles, vec!["Post p3", "Post p2", "Post p1"]);
}

#[tokio::test]
async fn test_file_database_survives_reopen() {
    let dir = std::env::temp_dir().join(format!("feedsync_lifecycle_{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("feeds.db");
    let path_str = path.to_str().unwrap();

    let feed_id = {
        let db = Database::open(path_str).await.unwrap();
        let user = db.create_user("u").await.unwrap();
        let feed = db
            .create_feed(user.id, "F", "https://example.com/rss")
            .await
            .unwrap();
        db.mark_fetched(feed.id).await.unwrap();
        feed.id
    };

    let db = Database::open(path_str).await.unwrap();
    let feed = db.get_feed(feed_id).await.unwrap().unwrap();
    assert!(feed.last_fetched_at.is_some());

    std::fs::remove_dir_all(&dir).ok();
}
