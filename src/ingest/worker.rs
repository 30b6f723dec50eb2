use std::time::Duration;

use super::shutdown::Shutdown;
use super::store::IngestionStore;
use crate::feed::{FeedSource, FetchError, ParsedItem};
use crate::storage::{Feed, NewPost};

/// Per-item tallies for one successfully fetched feed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    /// Items present in the fetched document
    pub items: usize,
    pub inserted: usize,
    /// Items the store already had
    pub duplicates: usize,
    /// Items skipped because the insert failed for another reason
    pub failed: usize,
}

/// How one worker invocation ended.
///
/// Only used for the tick summary; the scheduler treats every outcome as "done".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// The last-fetched update failed, nothing was fetched
    LeaseFailed,
    /// Network, timeout or parse failure after a successful lease
    FetchFailed,
    /// Shutdown arrived before or during the fetch
    Cancelled,
    Ingested(IngestStats),
}

/// Fetch, parse and ingest one feed.
///
/// 1. Lease: stamp the feed as fetched *before* touching the network, so a
///    slow source is not re-selected on the next tick. Lease failure aborts.
/// 2. Fetch under `fetch_timeout`, racing `shutdown`. Any failure aborts with
///    nothing ingested.
/// 3. Insert every item in source order. Duplicates are expected and silent;
///    other insert errors skip only that item.
///
/// Never panics on store or source errors and never propagates them.
pub async fn process_feed<S, F>(
    store: &S,
    source: &F,
    feed: Feed,
    fetch_timeout: Duration,
    shutdown: &mut Shutdown,
) -> FeedOutcome
where
    S: IngestionStore + ?Sized,
    F: FeedSource + ?Sized,
{
    if shutdown.is_triggered() {
        return FeedOutcome::Cancelled;
    }

    if let Err(e) = store.mark_fetched(feed.id).await {
        tracing::error!(feed_id = %feed.id, feed = %feed.name, error = %e, "Failed to mark feed as fetched");
        return FeedOutcome::LeaseFailed;
    }

    let fetched = tokio::select! {
        biased;
        _ = shutdown.triggered() => Err(FetchError::Cancelled),
        result = tokio::time::timeout(fetch_timeout, source.fetch(&feed.url)) => {
            result.unwrap_or_else(|_| Err(FetchError::Timeout))
        }
    };

    let parsed = match fetched {
        Ok(parsed) => parsed,
        Err(FetchError::Cancelled) => {
            tracing::info!(feed_id = %feed.id, feed = %feed.name, "Fetch cancelled by shutdown");
            return FeedOutcome::Cancelled;
        }
        Err(e) => {
            tracing::warn!(
                feed_id = %feed.id,
                feed = %feed.name,
                url = %feed.url,
                error = %e,
                "Failed to fetch feed"
            );
            return FeedOutcome::FetchFailed;
        }
    };

    let mut stats = IngestStats {
        items: parsed.items.len(),
        ..IngestStats::default()
    };

    for item in parsed.items {
        let post = new_post(&feed, item);
        match store.insert_post(&post).await {
            Ok(()) => stats.inserted += 1,
            Err(e) if e.is_duplicate() => {
                tracing::trace!(feed_id = %feed.id, url = %post.url, "Post already stored");
                stats.duplicates += 1;
            }
            Err(e) => {
                tracing::warn!(
                    feed_id = %feed.id,
                    url = %post.url,
                    error = %e,
                    "Failed to create post"
                );
                stats.failed += 1;
            }
        }
    }

    tracing::info!(
        feed = %feed.name,
        items = stats.items,
        inserted = stats.inserted,
        "Feed collected"
    );
    FeedOutcome::Ingested(stats)
}

/// Map a parsed item to an insert payload for `feed`.
fn new_post(feed: &Feed, item: ParsedItem) -> NewPost {
    let published_at = match parse_pub_date(&item.pub_date) {
        Ok(ts) => Some(ts),
        Err(e) => {
            tracing::warn!(
                feed_id = %feed.id,
                date = %item.pub_date,
                error = %e,
                "Couldn't parse publication date"
            );
            None
        }
    };

    NewPost {
        feed_id: feed.id,
        title: item.title,
        description: Some(item.description).filter(|d| !d.is_empty()),
        published_at,
        url: item.link,
    }
}

/// Parse an RSS publication date (RFC 2822 / RFC 1123 with numeric zone) to unix seconds.
pub fn parse_pub_date(raw: &str) -> Result<i64, chrono::ParseError> {
    chrono::DateTime::parse_from_rfc2822(raw.trim()).map(|dt| dt.timestamp())
}
