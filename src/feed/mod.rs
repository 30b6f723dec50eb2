//! Feed Source Client: retrieve a feed URL and parse it.
//!
//! - [`source`] - the [`FeedSource`] contract the ingestion core consumes
//! - [`fetcher`] - [`HttpFeedSource`], the `reqwest` implementation
//! - [`parser`] - RSS 2.0 via quick-xml serde, everything else via `feed-rs`

mod fetcher;
mod parser;
mod source;

pub use fetcher::{HttpFeedSource, DEFAULT_MAX_FEED_BYTES};
pub use parser::parse_feed;
pub use source::{FeedSource, FetchError, ParsedFeed, ParsedItem};
