//! The feed-fetch scheduler and everything it drives.
//!
//! [`Scheduler`] ticks on a fixed interval, selects the most overdue feeds
//! from an [`IngestionStore`] and fans out one [`process_feed`] task per feed.

pub mod shutdown;
mod scheduler;
mod store;
mod worker;

pub use scheduler::{Scheduler, SchedulerError, SchedulerOptions, TickSummary};
pub use shutdown::{Shutdown, ShutdownHandle};
pub use store::IngestionStore;
pub use worker::{parse_pub_date, process_feed, FeedOutcome, IngestStats};
