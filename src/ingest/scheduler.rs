use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use super::shutdown::Shutdown;
use super::store::IngestionStore;
use super::worker::{process_feed, FeedOutcome};
use crate::feed::FeedSource;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("Polling interval must be greater than zero")]
    ZeroInterval,
}

/// Validated scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    concurrency: usize,
    interval: Duration,
    fetch_timeout: Duration,
}

impl SchedulerOptions {
    pub const DEFAULT_CONCURRENCY: usize = 10;
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
    pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

    /// `concurrency` is both the batch size and the cap on in-flight fetches.
    ///
    /// A zero `fetch_timeout` is accepted and fails every fetch immediately.
    pub fn new(
        concurrency: usize,
        interval: Duration,
        fetch_timeout: Duration,
    ) -> Result<Self, SchedulerError> {
        if concurrency == 0 {
            return Err(SchedulerError::ZeroConcurrency);
        }
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        Ok(Self {
            concurrency,
            interval,
            fetch_timeout,
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: Self::DEFAULT_CONCURRENCY,
            interval: Self::DEFAULT_INTERVAL,
            fetch_timeout: Self::DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// What one tick did. Logging and tests only.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    /// Feeds returned by selection
    pub selected: usize,
    pub ingested: usize,
    /// Lease or fetch failures
    pub failed: usize,
    pub cancelled: usize,
    /// New posts across the batch
    pub inserted: usize,
    pub panicked: usize,
    pub selection_failed: bool,
}

impl TickSummary {
    fn record(&mut self, outcome: FeedOutcome) {
        match outcome {
            FeedOutcome::LeaseFailed | FeedOutcome::FetchFailed => self.failed += 1,
            FeedOutcome::Cancelled => self.cancelled += 1,
            FeedOutcome::Ingested(stats) => {
                self.ingested += 1;
                self.inserted += stats.inserted;
            }
        }
    }
}

/// Fixed-interval polling loop over an [`IngestionStore`].
///
/// Each tick selects up to `concurrency` of the most overdue feeds, runs one
/// worker task per feed and joins the whole batch before the next tick, so
/// batches never overlap and at most `concurrency` fetches are ever in flight.
pub struct Scheduler<S: ?Sized, F: ?Sized> {
    store: Arc<S>,
    source: Arc<F>,
    options: SchedulerOptions,
}

impl<S, F> Scheduler<S, F>
where
    S: IngestionStore + ?Sized + 'static,
    F: FeedSource + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, source: Arc<F>, options: SchedulerOptions) -> Self {
        Self {
            store,
            source,
            options,
        }
    }

    /// Tick until `shutdown` fires.
    ///
    /// The first tick runs immediately. A batch slower than the interval
    /// delays the next tick instead of queueing extra ones. On shutdown the
    /// in-flight batch is cancelled and joined before returning.
    pub async fn run(&self, mut shutdown: Shutdown) {
        let mut timer = tokio::time::interval(self.options.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            concurrency = self.options.concurrency,
            interval_secs = self.options.interval.as_secs_f64(),
            "Collecting feeds"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                _ = timer.tick() => {}
            }

            self.tick(&shutdown).await;

            if shutdown.is_triggered() {
                break;
            }
        }

        tracing::info!("Scheduler stopped");
    }

    /// Run one select/fan-out/join cycle.
    pub async fn tick(&self, shutdown: &Shutdown) -> TickSummary {
        let mut summary = TickSummary::default();

        let feeds = match self.store.select_due_feeds(self.options.concurrency).await {
            Ok(feeds) => feeds,
            Err(e) => {
                tracing::error!(error = %e, "Couldn't get next feeds to fetch");
                summary.selection_failed = true;
                return summary;
            }
        };

        if feeds.is_empty() {
            tracing::debug!("No feeds to fetch");
            return summary;
        }
        summary.selected = feeds.len();

        let mut workers = JoinSet::new();
        for feed in feeds {
            let store = Arc::clone(&self.store);
            let source = Arc::clone(&self.source);
            let mut shutdown = shutdown.clone();
            let fetch_timeout = self.options.fetch_timeout;
            workers.spawn(async move {
                process_feed(&*store, &*source, feed, fetch_timeout, &mut shutdown).await
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome),
                Err(e) if e.is_panic() => {
                    tracing::error!(error = %e, "Feed worker panicked");
                    summary.panicked += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Feed worker aborted");
                    summary.cancelled += 1;
                }
            }
        }

        tracing::info!(
            selected = summary.selected,
            ingested = summary.ingested,
            failed = summary.failed,
            cancelled = summary.cancelled,
            inserted = summary.inserted,
            "Tick complete"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FetchError, ParsedFeed, ParsedItem};
    use crate::ingest::shutdown;
    use crate::storage::{DatabaseError, Feed, NewPost};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FixedStore {
        feeds: Vec<Feed>,
        fail_select: bool,
        requested: Mutex<Vec<usize>>,
        selections: AtomicUsize,
    }

    impl FixedStore {
        fn new(feeds: Vec<Feed>) -> Self {
            Self {
                feeds,
                fail_select: false,
                requested: Mutex::new(Vec::new()),
                selections: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IngestionStore for FixedStore {
        async fn select_due_feeds(&self, limit: usize) -> Result<Vec<Feed>, DatabaseError> {
            self.selections.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(limit);
            if self.fail_select {
                return Err(DatabaseError::InstanceLocked);
            }
            Ok(self.feeds.iter().take(limit).cloned().collect())
        }

        async fn mark_fetched(&self, _feed_id: Uuid) -> Result<Feed, DatabaseError> {
            Ok(feed("leased"))
        }

        async fn insert_post(&self, _post: &NewPost) -> Result<(), DatabaseError> {
            Ok(())
        }
    }

    /// One item per feed; panics on URLs containing "panic"
    struct OneItemSource;

    #[async_trait]
    impl FeedSource for OneItemSource {
        async fn fetch(&self, url: &str) -> Result<ParsedFeed, FetchError> {
            if url.contains("panic") {
                panic!("source blew up");
            }
            if url.contains("fail") {
                return Err(FetchError::Parse("bad".to_string()));
            }
            Ok(ParsedFeed {
                items: vec![ParsedItem {
                    link: format!("{url}/1"),
                    ..ParsedItem::default()
                }],
                ..ParsedFeed::default()
            })
        }
    }

    fn feed(name: &str) -> Feed {
        Feed {
            id: Uuid::new_v4(),
            created_at: 0,
            updated_at: 0,
            name: name.to_string(),
            url: format!("https://example.com/{name}"),
            user_id: Uuid::nil(),
            last_fetched_at: None,
        }
    }

    fn scheduler(store: FixedStore, concurrency: usize) -> Scheduler<FixedStore, OneItemSource> {
        let options =
            SchedulerOptions::new(concurrency, Duration::from_secs(60), Duration::from_secs(5))
                .unwrap();
        Scheduler::new(Arc::new(store), Arc::new(OneItemSource), options)
    }

    #[test]
    fn test_options_reject_zero_values() {
        assert_eq!(
            SchedulerOptions::new(0, Duration::from_secs(1), Duration::from_secs(1)),
            Err(SchedulerError::ZeroConcurrency)
        );
        assert_eq!(
            SchedulerOptions::new(1, Duration::ZERO, Duration::from_secs(1)),
            Err(SchedulerError::ZeroInterval)
        );
    }

    #[test]
    fn test_options_defaults() {
        let options = SchedulerOptions::default();
        assert_eq!(options.concurrency(), 10);
        assert_eq!(options.interval(), Duration::from_secs(60));
        assert_eq!(options.fetch_timeout(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_tick_requests_concurrency_limit() {
        let feeds = (0..5).map(|i| feed(&format!("f{i}"))).collect();
        let scheduler = scheduler(FixedStore::new(feeds), 3);

        let summary = scheduler.tick(&Shutdown::never()).await;

        assert_eq!(*scheduler.store.requested.lock().unwrap(), vec![3]);
        assert_eq!(summary.selected, 3);
        assert_eq!(summary.ingested, 3);
        assert_eq!(summary.inserted, 3);
    }

    #[tokio::test]
    async fn test_empty_selection_is_noop() {
        let scheduler = scheduler(FixedStore::new(Vec::new()), 4);
        let summary = scheduler.tick(&Shutdown::never()).await;
        assert_eq!(summary, TickSummary::default());
    }

    #[tokio::test]
    async fn test_selection_failure_skips_tick() {
        let mut store = FixedStore::new(vec![feed("a")]);
        store.fail_select = true;
        let scheduler = scheduler(store, 4);

        let summary = scheduler.tick(&Shutdown::never()).await;

        assert!(summary.selection_failed);
        assert_eq!(summary.selected, 0);
    }

    #[tokio::test]
    async fn test_panicking_worker_is_isolated() {
        let store = FixedStore::new(vec![feed("ok"), feed("panic"), feed("fail")]);
        let scheduler = scheduler(store, 3);

        let summary = scheduler.tick(&Shutdown::never()).await;

        assert_eq!(summary.selected, 3);
        assert_eq!(summary.ingested, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.panicked, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_on_interval_until_shutdown() {
        let scheduler = Arc::new(scheduler(FixedStore::new(vec![feed("a")]), 1));
        let (handle, signal) = shutdown::channel();

        let runner = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run(signal).await })
        };

        // Immediate first tick, then one per 60s
        tokio::time::sleep(Duration::from_secs(150)).await;
        handle.trigger();
        runner.await.unwrap();

        assert_eq!(scheduler.store.selections.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_returns_when_already_shut_down() {
        let scheduler = scheduler(FixedStore::new(vec![feed("a")]), 1);
        let (handle, signal) = shutdown::channel();
        handle.trigger();

        scheduler.run(signal).await;

        assert_eq!(scheduler.store.selections.load(Ordering::SeqCst), 0);
    }
}
