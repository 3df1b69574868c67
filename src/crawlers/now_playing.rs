// =============================================================================
// crawlers/now_playing.rs — THE GENERIC "WHAT'S ON?" CRAWLER
// =============================================================================
//
// Most stations expose some JSON endpoint behind their "now playing"
// widget. The shapes differ wildly, so instead of one crawler per station
// this crawler takes two JSON Pointers and digs title and artist out of
// whatever the station sends back.
//
// Scheduling is the crawler's own business: after every attempt, success
// or failure, it pushes its next crawl time one interval into the future.
// A station whose endpoint keeps failing trips its circuit breaker and is
// left alone for the cooldown.
// =============================================================================

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::circuit_breaker::{BreakerSettings, CircuitBreaker, CircuitState};
use crate::crawler::{CrawlError, Crawler};
use crate::crawlers::stations::Station;
use crate::models::TrackInfo;

/// Build the HTTP client shared by every station.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("radiowatch/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Crawls one station's JSON "now playing" endpoint.
pub struct NowPlayingCrawler {
    name: String,
    url: Url,
    title_pointer: String,
    artist_pointer: String,
    interval: chrono::Duration,
    client: reqwest::Client,
    breaker: CircuitBreaker,
    next_crawl: Mutex<DateTime<Utc>>,
}

impl NowPlayingCrawler {
    /// A fresh crawler is due immediately.
    pub fn new(station: Station, client: reqwest::Client, breaker: BreakerSettings) -> Self {
        let interval =
            chrono::Duration::from_std(station.interval).unwrap_or(chrono::Duration::MAX);
        Self {
            breaker: CircuitBreaker::new(station.name.clone(), breaker),
            name: station.name,
            url: station.url,
            title_pointer: station.title_pointer,
            artist_pointer: station.artist_pointer,
            interval,
            client,
            next_crawl: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Intervals too large to add to the current time park the station at
    /// the end of time.
    fn schedule_next(&self) {
        *self.next_crawl.lock() = Utc::now()
            .checked_add_signed(self.interval)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    async fn fetch(&self) -> Result<TrackInfo, CrawlError> {
        let response = self.client.get(self.url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CrawlError::Malformed(format!("body is not JSON: {e}")))?;

        let title = extract(&body, &self.title_pointer)?;
        let artist = extract(&body, &self.artist_pointer)?;

        Ok(TrackInfo::new(title, artist, self.name.clone()))
    }
}

fn extract(body: &Value, pointer: &str) -> Result<String, CrawlError> {
    match body.pointer(pointer) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(CrawlError::Malformed(format!(
            "expected a string at '{pointer}', found {other}"
        ))),
        None => Err(CrawlError::Malformed(format!("nothing at '{pointer}'"))),
    }
}

#[async_trait::async_trait]
impl Crawler for NowPlayingCrawler {
    async fn crawl(&self) -> Result<TrackInfo, CrawlError> {
        if !self.breaker.allow_request() {
            self.schedule_next();
            return Err(CrawlError::CircuitOpen(self.name.clone()));
        }

        let result = self.fetch().await;
        match &result {
            Ok(_) | Err(CrawlError::Malformed(_)) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }
        self.schedule_next();

        debug!(station = %self.name, ok = result.is_ok(), "Station polled");
        result
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn next_crawl_time(&self) -> DateTime<Utc> {
        *self.next_crawl.lock()
    }
}
