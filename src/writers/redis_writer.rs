// =============================================================================
// writers/redis_writer.rs — THE REDIS ARCHIVIST
// =============================================================================
//
// The database writer. Every track goes to two places:
//
// 1. ZADD <prefix>:station:<station>  — a sorted set per station, scored by
//    crawl time. The durable airplay log.
// 2. PUBLISH <prefix>:tracks           — for anyone listening live.
//
// Before the first write for a station, the station is registered in the
// set <prefix>:stations, so consumers can discover what exists without
// a KEYS scan. Which stations are already registered is kept in a
// mutex-guarded set. Two tasks racing on the first write for a station
// may both SADD; SADD is idempotent so that is harmless.
//
// A track identical to the station's previous one is skipped (see
// RepeatGuard). If persisting fails the guard forgets the track so the
// next crawl gets another shot at it.
//
// The connection is established lazily on the first write and shared by
// every write task afterwards (ConnectionManager reconnects on its own).
// A failed first connection is not cached: the next write tries again,
// with up to `connect_retries` backoff retries each time.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::dedup::RepeatGuard;
use crate::models::TrackInfo;
use crate::writers::{Writer, WriterStats};

/// Persists tracks to Redis.
pub struct RedisWriter {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    prefix: String,
    registered: Mutex<HashSet<String>>,
    repeat_guard: Arc<RepeatGuard>,
    connect_retries: usize,
    stats: Arc<WriterStats>,
}

const DEFAULT_CONNECT_RETRIES: usize = 6;

impl RedisWriter {
    /// Create a new RedisWriter. No connection is made until the first write.
    ///
    /// # Arguments
    /// * `redis_url` - e.g. `redis://127.0.0.1:6379`
    /// * `prefix` - namespace for every key this writer touches
    /// * `repeat_guard` - back-to-back repeat suppression, may be shared
    pub fn new(redis_url: &str, prefix: impl Into<String>, repeat_guard: Arc<RepeatGuard>) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            prefix: prefix.into(),
            registered: Mutex::new(HashSet::new()),
            repeat_guard,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            stats: Arc::new(WriterStats::new()),
        })
    }

    /// How often establishing the connection is retried before a write
    /// gives up. Default: 6.
    pub fn with_connect_retries(mut self, retries: usize) -> Self {
        self.connect_retries = retries;
        self
    }

    pub fn stats(&self) -> Arc<WriterStats> {
        Arc::clone(&self.stats)
    }

    pub fn stations_key(&self) -> String {
        format!("{}:stations", self.prefix)
    }

    pub fn station_key(&self, normalized_station: &str) -> String {
        format!("{}:station:{}", self.prefix, normalized_station)
    }

    pub fn channel(&self) -> String {
        format!("{}:tracks", self.prefix)
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                let config =
                    ConnectionManagerConfig::new().set_number_of_retries(self.connect_retries);
                let manager =
                    ConnectionManager::new_with_config(self.client.clone(), config).await?;
                info!(prefix = %self.prefix, "Redis connection established");
                Ok::<_, redis::RedisError>(manager)
            })
            .await?;
        Ok(connection.clone())
    }

    fn is_registered(&self, station: &str) -> bool {
        self.registered.lock().contains(station)
    }

    async fn persist(&self, track: &TrackInfo) -> Result<()> {
        let mut con = self.connection().await?;
        let station = track.normalized_station_name();

        if !self.is_registered(&station) {
            let _: () = con.sadd(self.stations_key(), &station).await?;
            self.registered.lock().insert(station.clone());
            debug!(station = %station, "Station registered");
        }

        let json = serde_json::to_string(track)?;
        let score = track.crawl_time.timestamp() as f64;

        let _: () = con.zadd(self.station_key(&station), &json, score).await?;
        let _: () = con.publish(self.channel(), &json).await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl Writer for RedisWriter {
    async fn write(&self, track: TrackInfo) {
        if !self.repeat_guard.check_and_remember(&track) {
            self.stats.record_skipped();
            return;
        }

        match self.persist(&track).await {
            Ok(()) => {
                self.stats.record_written();
                debug!(
                    station = %track.station,
                    artist = %track.artist,
                    title = %track.title,
                    "Track written to Redis"
                );
            }
            Err(e) => {
                self.repeat_guard.forget(&track);
                self.stats.record_error();
                error!(
                    station = %track.station,
                    error = %e,
                    "Error when writing to Redis"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer(url: &str) -> RedisWriter {
        RedisWriter::new(url, "radiowatch", Arc::new(RepeatGuard::new(8))).unwrap()
    }

    #[test]
    fn test_key_layout() {
        let writer = writer("redis://127.0.0.1:6379");
        assert_eq!(writer.stations_key(), "radiowatch:stations");
        assert_eq!(writer.station_key("fm4"), "radiowatch:station:fm4");
        assert_eq!(writer.channel(), "radiowatch:tracks");
    }

    #[tokio::test]
    async fn test_failed_persist_counts_error_and_forgets_track() {
        let guard = Arc::new(RepeatGuard::new(8));
        let writer = RedisWriter::new("redis://127.0.0.1:1", "radiowatch", Arc::clone(&guard))
            .unwrap()
            .with_connect_retries(0);
        let track = TrackInfo::new("Song A", "Band A", "FM4");

        writer.write(track.clone()).await;
        writer.write(track).await;

        let stats = writer.stats().snapshot();
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.written, 0);
        assert_eq!(guard.snapshot().repeats, 0);
        assert!(writer.registered.lock().is_empty());
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(RedisWriter::new("not a url", "radiowatch", Arc::new(RepeatGuard::new(8))).is_err());
    }
}
