// =============================================================================
// crawler.rs — THE CRAWLER CONTRACT
// =============================================================================
//
// A crawler watches exactly one radio station. It knows three things:
// how to ask the station what's playing, what the station is called, and
// when it should be asked again. The watcher knows none of those things
// and is very happy not to.
// =============================================================================

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::TrackInfo;

/// Everything that can go wrong while asking a station what it's playing.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The HTTP request itself failed (DNS, connect, TLS, body read).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The station answered with a non-success status code.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The response body was not what we expected.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The station's circuit breaker is open; no request was made.
    #[error("circuit breaker open for {0}")]
    CircuitOpen(String),

    /// Anything else a crawler wants to report.
    #[error("{0}")]
    Other(String),
}

impl CrawlError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// A concrete Crawler crawls one specific radio station and returns
/// information about the currently played track.
///
/// # Concurrency
///
/// The watcher calls `crawl` at most once per crawler per cycle, but two
/// overlapping cycles may call the same crawler concurrently. Implementations
/// that keep mutable state must guard it themselves.
///
/// `next_crawl_time` is called once per cycle for every registered crawler
/// and must be cheap. The crawler is solely responsible for moving it forward,
/// typically at the end of every `crawl`. A panic in it is caught and logged,
/// and the crawler is skipped for that cycle.
#[async_trait::async_trait]
pub trait Crawler: Send + Sync + 'static {
    /// Take the needed actions to get information about the currently
    /// played track.
    async fn crawl(&self) -> Result<TrackInfo, CrawlError>;

    /// The name of the station being crawled. Used for logging.
    fn name(&self) -> &str;

    /// When this crawler should run next.
    fn next_crawl_time(&self) -> DateTime<Utc>;
}
