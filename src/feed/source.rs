use async_trait::async_trait;
use thiserror::Error;

use crate::util::UrlError;

/// Errors that can occur while retrieving and parsing a feed.
///
/// The ingestion worker logs these and abandons the feed for the current
/// tick; it never branches on the variant.
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL refused by the configured [`UrlPolicy`](crate::util::UrlPolicy)
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlError),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Fetch exceeded the per-feed deadline
    #[error("Request timed out")]
    Timeout,
    /// Shutdown was requested while the fetch was in flight
    #[error("Fetch cancelled by shutdown")]
    Cancelled,
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Document is not a feed either parser understands
    #[error("Parse error: {0}")]
    Parse(String),
}

/// A feed document reduced to what ingestion needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub title: String,
    pub description: String,
    /// Items in document order
    pub items: Vec<ParsedItem>,
}

/// One entry of a [`ParsedFeed`]. Missing elements are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedItem {
    pub title: String,
    /// Canonical item URL; together with the feed id it is the dedup key
    pub link: String,
    pub description: String,
    /// Publication date exactly as the source wrote it (RFC 2822 for RSS)
    pub pub_date: String,
}

/// Retrieves a feed document by URL and parses it.
///
/// Implementations are shared by every worker in a batch, so they must be
/// `Send + Sync`. Deadlines and cancellation are applied by the caller.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ParsedFeed, FetchError>;
}
