// =============================================================================
// watcher.rs — THE METRONOME
// =============================================================================
//
// The Watcher owns the station registry, the writer, and the refresh
// interval. start_crawling() runs one cycle right away and waits for it,
// then hands a copy of everything to a background loop that starts a new
// cycle on every tick until stop_crawling() is called.
//
// Ticks never wait for the previous cycle. If a cycle takes longer than
// the interval, the next one starts anyway and the two overlap. A crawler
// that is still mid-crawl has not moved its next crawl time yet, so an
// overlapping cycle can call it again. Crawlers are Sync for a reason.
//
// Stopping only stops the ticking. Cycles and writes already running are
// left to finish on their own.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::crawler::Crawler;
use crate::dispatcher::{CycleDispatcher, CycleReport};
use crate::metrics::WatchMetrics;
use crate::writers::Writer;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WatchError {
    #[error("invalid refresh interval '{input}': {reason}")]
    InvalidInterval { input: String, reason: String },

    #[error("watcher is already crawling")]
    AlreadyRunning,

    #[error("watcher is not crawling")]
    NotRunning,
}

/// Parse a duration string like "60s", "5m" or "1h 30m".
pub fn parse_interval(input: &str) -> Result<Duration, WatchError> {
    let trimmed = input.trim();
    let invalid = |reason: String| WatchError::InvalidInterval {
        input: input.to_string(),
        reason,
    };

    if trimmed.is_empty() {
        return Err(invalid("empty".to_string()));
    }
    let interval = humantime::parse_duration(trimmed).map_err(|e| invalid(e.to_string()))?;
    if interval.is_zero() {
        return Err(invalid("must be greater than zero".to_string()));
    }
    Ok(interval)
}

/// Schedules crawling cycles over a registry of crawlers.
pub struct Watcher {
    refresh_interval: Duration,
    crawlers: Vec<Arc<dyn Crawler>>,
    writer: Arc<dyn Writer>,
    metrics: Arc<WatchMetrics>,
    running: Option<watch::Sender<bool>>,
}

impl Watcher {
    pub fn new(writer: Arc<dyn Writer>) -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            crawlers: Vec::new(),
            writer,
            metrics: Arc::new(WatchMetrics::new()),
            running: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<WatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<WatchMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Change the tick period. On error the old interval stays in place.
    /// Takes effect at the next start_crawling().
    pub fn set_interval(&mut self, interval: &str) -> Result<(), WatchError> {
        self.refresh_interval = parse_interval(interval)?;
        debug!(interval = ?self.refresh_interval, "Refresh interval set");
        Ok(())
    }

    pub fn add_crawler(&mut self, crawler: Arc<dyn Crawler>) {
        self.crawlers.push(crawler);
    }

    pub fn add_crawlers<I>(&mut self, crawlers: I)
    where
        I: IntoIterator<Item = Arc<dyn Crawler>>,
    {
        self.crawlers.extend(crawlers);
    }

    pub fn crawler_count(&self) -> usize {
        self.crawlers.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Run one cycle now, wait for it, then keep starting a cycle every
    /// refresh interval in the background. Returns the first cycle's report.
    ///
    /// The registry is copied here; crawlers added afterwards join at the
    /// next start.
    pub async fn start_crawling(&mut self) -> Result<CycleReport, WatchError> {
        if self.running.is_some() {
            return Err(WatchError::AlreadyRunning);
        }

        let dispatcher = CycleDispatcher::new(
            self.crawlers.clone().into(),
            Arc::clone(&self.writer),
            Arc::clone(&self.metrics),
        );
        let period = self.refresh_interval;

        info!(
            crawlers = dispatcher.crawler_count(),
            interval = %humantime::format_duration(period),
            "Starting to crawl"
        );

        let first = dispatcher.run_cycle().await;

        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(tick_loop(dispatcher, period, stop_rx));
        self.running = Some(stop_tx);

        Ok(first)
    }

    /// Stop ticking. Cycles already running finish on their own.
    pub fn stop_crawling(&mut self) -> Result<(), WatchError> {
        let stop = self.running.take().ok_or(WatchError::NotRunning)?;
        let _ = stop.send(true);
        info!("Stopped crawling");
        Ok(())
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if let Some(stop) = self.running.take() {
            let _ = stop.send(true);
        }
    }
}

async fn tick_loop(dispatcher: CycleDispatcher, period: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            changed = stop.changed() => {
                // A dropped sender means the watcher is gone; stop either way.
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher.run_cycle().await;
                });
            }
        }
    }

    debug!("Tick loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingWriter, StubCrawler};

    fn watcher_with(crawlers: Vec<Arc<StubCrawler>>) -> (Watcher, Arc<RecordingWriter>) {
        let writer = Arc::new(RecordingWriter::new());
        let mut watcher = Watcher::new(writer.clone());
        watcher.add_crawlers(crawlers.into_iter().map(|c| c as Arc<dyn Crawler>));
        (watcher, writer)
    }

    #[test]
    fn test_default_interval_is_sixty_seconds() {
        let (watcher, _) = watcher_with(vec![]);
        assert_eq!(watcher.refresh_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_set_interval_parses_durations() {
        let (mut watcher, _) = watcher_with(vec![]);
        watcher.set_interval("5m").unwrap();
        assert_eq!(watcher.refresh_interval(), Duration::from_secs(300));
        watcher.set_interval(" 1h 30m ").unwrap();
        assert_eq!(watcher.refresh_interval(), Duration::from_secs(5400));
        watcher.set_interval("250ms").unwrap();
        assert_eq!(watcher.refresh_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_set_interval_rejects_bad_input_and_keeps_old_value() {
        let (mut watcher, _) = watcher_with(vec![]);
        watcher.set_interval("30s").unwrap();

        for bad in ["", "   ", "abc", "10 parsecs", "0s"] {
            let err = watcher.set_interval(bad).unwrap_err();
            assert!(matches!(err, WatchError::InvalidInterval { .. }), "{bad:?}");
            assert_eq!(watcher.refresh_interval(), Duration::from_secs(30));
        }
    }

    #[test]
    fn test_stop_before_start_is_an_error() {
        let (mut watcher, _) = watcher_with(vec![]);
        assert_eq!(watcher.stop_crawling(), Err(WatchError::NotRunning));
    }

    #[tokio::test]
    async fn test_start_twice_is_an_error() {
        let (mut watcher, _) = watcher_with(vec![]);
        watcher.start_crawling().await.unwrap();
        assert!(watcher.is_running());
        assert_eq!(
            watcher.start_crawling().await.unwrap_err(),
            WatchError::AlreadyRunning
        );
        watcher.stop_crawling().unwrap();
        assert!(!watcher.is_running());
        assert_eq!(watcher.stop_crawling(), Err(WatchError::NotRunning));
    }

    #[tokio::test]
    async fn test_first_cycle_runs_before_start_returns() {
        let a = Arc::new(StubCrawler::track("A", "Song A", "Band A"));
        let (mut watcher, writer) = watcher_with(vec![a.clone()]);

        let report = watcher.start_crawling().await.unwrap();

        assert_eq!(a.finished(), 1);
        assert_eq!(report.due, 1);
        assert_eq!(writer.wait_for(1).await.len(), 1);
        watcher.stop_crawling().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_start_new_cycles_until_stopped() {
        // Always due: the stub never moves its next crawl time.
        let a = Arc::new(StubCrawler::track("A", "Song", "Band"));
        let (mut watcher, _) = watcher_with(vec![a.clone()]);
        watcher.set_interval("60s").unwrap();

        watcher.start_crawling().await.unwrap();
        assert_eq!(a.started(), 1);

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(a.started(), 3);

        watcher.stop_crawling().unwrap();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(a.started(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_does_not_cancel_running_cycle() {
        let slow = Arc::new(
            StubCrawler::track("Slow", "Song", "Band").with_delay(Duration::from_secs(30)),
        );
        let (mut watcher, writer) = watcher_with(vec![slow.clone()]);
        watcher.set_interval("10s").unwrap();

        watcher.start_crawling().await.unwrap();
        assert_eq!(slow.finished(), 1);

        // The first cycle ate 30s; the tick 10s after that starts another.
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(slow.started(), 2);
        assert_eq!(slow.finished(), 1);

        watcher.stop_crawling().unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(slow.started(), 2);
        assert_eq!(slow.finished(), 2);
        assert_eq!(writer.tracks().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_overlap_when_slower_than_interval() {
        let slow = Arc::new(
            StubCrawler::track("Slow", "Song", "Band").with_delay(Duration::from_secs(25)),
        );
        let (mut watcher, _) = watcher_with(vec![slow.clone()]);
        watcher.set_interval("10s").unwrap();

        watcher.start_crawling().await.unwrap();

        // Ticks 10s and 20s after start returns; both cycles still sleep.
        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(slow.started(), 3);
        assert_eq!(slow.finished(), 1);

        watcher.stop_crawling().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_watcher_stops_ticking() {
        let a = Arc::new(StubCrawler::track("A", "Song", "Band"));
        let (mut watcher, _) = watcher_with(vec![a.clone()]);
        watcher.set_interval("10s").unwrap();
        watcher.start_crawling().await.unwrap();
        drop(watcher);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(a.started(), 1);
    }

    #[tokio::test]
    async fn test_crawlers_added_later_join_next_start() {
        let a = Arc::new(StubCrawler::track("A", "Song", "Band"));
        let b = Arc::new(StubCrawler::track("B", "Song", "Band"));
        let (mut watcher, _) = watcher_with(vec![a.clone()]);

        watcher.start_crawling().await.unwrap();
        watcher.add_crawler(b.clone());
        assert_eq!(watcher.crawler_count(), 2);
        assert_eq!(b.started(), 0);

        watcher.stop_crawling().unwrap();
        watcher.start_crawling().await.unwrap();
        assert_eq!(b.started(), 1);
        watcher.stop_crawling().unwrap();
    }
}
