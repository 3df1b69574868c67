// =============================================================================
// dedup.rs — THE BROKEN RECORD DETECTOR
// =============================================================================
//
// Radio stations update their "now playing" feed whenever they feel like
// it. Crawl every minute and a four-minute song shows up four times.
// The RepeatGuard remembers the last track written per station and says
// "no" to the same artist + title showing up again back to back.
//
// It is NOT a global "have we ever seen this" filter. Stations replay hits
// all day long and every one of those plays counts.
//
// Memory is bounded: an LRU keyed by normalized station name. A station
// that falls off the end simply gets its next track written unconditionally.
//
// check_and_remember is atomic under a parking_lot Mutex, so two overlapping
// cycles writing the same song for the same station let exactly one through.
// =============================================================================

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use portable_atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::models::TrackInfo;

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(n) => n,
    None => unreachable!(),
};

/// Remembers the last (artist, title) per station.
pub struct RepeatGuard {
    last: Mutex<LruCache<String, (String, String)>>,
    pub stats: RepeatStats,
}

/// Counters for metrics.
#[derive(Debug, Default)]
pub struct RepeatStats {
    /// Tracks checked against the guard
    pub checks: AtomicU64,
    /// Tracks that differed from the station's previous one
    pub fresh: AtomicU64,
    /// Tracks rejected as a back-to-back repeat
    pub repeats: AtomicU64,
}

/// A snapshot of repeat guard statistics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RepeatSnapshot {
    pub checks: u64,
    pub fresh: u64,
    pub repeats: u64,
    pub stations_remembered: usize,
}

impl RepeatGuard {
    /// Create a guard remembering up to `capacity` stations.
    /// A capacity of zero falls back to 1024.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CAPACITY);
        Self {
            last: Mutex::new(LruCache::new(capacity)),
            stats: RepeatStats::default(),
        }
    }

    /// Returns `true` if the track is NOT a repeat of the station's previous
    /// track, and remembers it as the new previous track.
    /// Returns `false` for a back-to-back repeat.
    pub fn check_and_remember(&self, track: &TrackInfo) -> bool {
        self.stats.checks.fetch_add(1, Ordering::Relaxed);

        let station = track.normalized_station_name();
        let key = track.repeat_key();

        let mut last = self.last.lock();
        if last.get(&station) == Some(&key) {
            self.stats.repeats.fetch_add(1, Ordering::Relaxed);
            debug!(station = %track.station, artist = %track.artist, title = %track.title, "Repeat suppressed");
            return false;
        }

        last.put(station, key);
        self.stats.fresh.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Drop what we remember about a station, but only if it still matches
    /// `track`. Used when persisting `track` failed, so the next attempt
    /// isn't mistaken for a repeat.
    pub fn forget(&self, track: &TrackInfo) {
        let station = track.normalized_station_name();
        let mut last = self.last.lock();
        if last.peek(&station) == Some(&track.repeat_key()) {
            last.pop(&station);
        }
    }

    pub fn snapshot(&self) -> RepeatSnapshot {
        RepeatSnapshot {
            checks: self.stats.checks.load(Ordering::Relaxed),
            fresh: self.stats.fresh.load(Ordering::Relaxed),
            repeats: self.stats.repeats.load(Ordering::Relaxed),
            stations_remembered: self.last.lock().len(),
        }
    }
}
