// =============================================================================
// writers/mod.rs — THE ARCHIVE WING
// =============================================================================
//
// Once a crawler has found out what's playing, somebody has to write it
// down. That somebody is a Writer. The watcher hands every track to the
// writer in its own detached task and immediately forgets about it.
//
// That has consequences. The watcher provides NO ordering and NO mutual
// exclusion between writes: two tracks for the same station may be written
// at the same time, and a later track may land before an earlier one.
// Any per-station state a writer keeps must be locked by the writer.
//
// Writers in stock:
// - CsvWriter   — tab-separated lines, one file per station
// - JsonWriter  — one JSON object per line, one file per station
// - RedisWriter — sorted set per station + pub/sub, repeat-suppressed
// =============================================================================

pub mod csv_writer;
pub mod file_writer;
pub mod json_writer;
pub mod redis_writer;

pub use csv_writer::CsvWriter;
pub use json_writer::JsonWriter;
pub use redis_writer::RedisWriter;

use portable_atomic::{AtomicU64, Ordering};

use crate::models::TrackInfo;

/// A Writer takes the TrackInfo and persists it.
///
/// How and where it is saved is up to the implementer. `write` cannot fail
/// from the caller's point of view: implementations log their errors and
/// swallow them.
///
/// # Thread safety
///
/// `write` is called concurrently from many tasks, for the same station or
/// different ones, in no particular order. Implementations must serialize
/// access to any mutable per-destination state themselves.
#[async_trait::async_trait]
pub trait Writer: Send + Sync + 'static {
    /// Persist one track.
    async fn write(&self, track: TrackInfo);
}

/// Counters shared by all writers.
#[derive(Debug, Default)]
pub struct WriterStats {
    pub written: AtomicU64,
    pub skipped: AtomicU64,
    pub errors: AtomicU64,
}

/// A serializable snapshot of writer stats.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct WriterSnapshot {
    pub written: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl WriterStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WriterSnapshot {
        WriterSnapshot {
            written: self.written.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
