// =============================================================================
// models.rs — THE SACRED DATA STRUCTURES OF AIRPLAY
// =============================================================================
//
// One struct to rule them all: TrackInfo. Every crawler produces one, every
// writer consumes one. It carries exactly four facts about the universe:
// what was playing, who was playing it, where, and when we noticed.
//
// Is a dedicated module for one struct overkill? The struct has a regex.
// It earned a module.
// =============================================================================

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Runs of non-word characters. ASCII word characters only, so "Ö3"
/// normalizes to "3" and the result is always a portable file name.
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^0-9A-Za-z_]+").expect("failed to compile station name regex")
});

/// Information about the track a station was playing at `crawl_time`.
///
/// Produced exactly once per successful crawl. The dispatcher trims
/// `title` and `artist` before any writer ever sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// The title of the track
    pub title: String,

    /// The name of the artist
    pub artist: String,

    /// The time at which this information was crawled
    pub crawl_time: DateTime<Utc>,

    /// The name of the station at which this track was played
    pub station: String,
}

impl TrackInfo {
    /// Create a new TrackInfo stamped with the current time.
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        station: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            crawl_time: Utc::now(),
            station: station.into(),
        }
    }

    /// Strip surrounding whitespace from title and artist.
    /// Radio metadata arrives padded more often than you'd believe.
    pub fn trimmed(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.artist = self.artist.trim().to_string();
        self
    }

    /// The station name in a form safe to use as a file name or key.
    /// See [`normalize_station_name`].
    pub fn normalized_station_name(&self) -> String {
        normalize_station_name(&self.station)
    }

    /// Key used to recognise the same song played back to back.
    pub fn repeat_key(&self) -> (String, String) {
        (self.artist.clone(), self.title.clone())
    }
}

impl fmt::Display for TrackInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} — {} @ {}",
            self.station,
            self.artist,
            self.title,
            self.crawl_time.to_rfc3339()
        )
    }
}

/// Lowercases the name, collapses every run of non-word characters into
/// a single `_` and trims leading and trailing underscores.
pub fn normalize_station_name(station: &str) -> String {
    let lower = station.to_lowercase();
    NON_WORD
        .replace_all(&lower, "_")
        .trim_matches('_')
        .to_string()
}
