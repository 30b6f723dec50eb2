use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;

use super::parser::parse_feed;
use super::source::{FeedSource, FetchError, ParsedFeed};
use crate::util::UrlPolicy;

/// Default cap on a feed body: 10 MiB
pub const DEFAULT_MAX_FEED_BYTES: usize = 10 * 1024 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`FeedSource`] backed by `reqwest`.
///
/// One GET per call, no retries: a failed feed waits for its next turn in
/// the schedule. The overall deadline is enforced by the worker.
#[derive(Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
    policy: UrlPolicy,
    max_bytes: usize,
}

impl HttpFeedSource {
    /// Build a source with its own HTTP client.
    pub fn new(user_agent: &str, policy: UrlPolicy, max_bytes: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, policy, max_bytes))
    }

    pub fn with_client(client: reqwest::Client, policy: UrlPolicy, max_bytes: usize) -> Self {
        Self {
            client,
            policy,
            max_bytes,
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<ParsedFeed, FetchError> {
        let url = self.policy.check(url)?;

        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, self.max_bytes).await?;
        let feed = parse_feed(&bytes)?;

        tracing::debug!(
            url = %url,
            bytes = bytes.len(),
            items = feed.items.len(),
            "Fetched feed document"
        );
        Ok(feed)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
