//! feedsync: a scheduled RSS ingestion service backed by SQLite.

pub mod config;
pub mod feed;
pub mod ingest;
pub mod storage;
pub mod util;
