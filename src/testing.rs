//! Test doubles shared by the dispatcher and watcher tests.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::crawler::{CrawlError, Crawler};
use crate::models::TrackInfo;
use crate::writers::Writer;

/// What a StubCrawler does when crawled.
#[derive(Debug, Clone)]
pub enum Behavior {
    Track { title: String, artist: String },
    Fail(String),
    Panic(String),
}

/// A crawler with scripted behaviour that counts its invocations.
pub struct StubCrawler {
    name: String,
    next: Mutex<DateTime<Utc>>,
    behavior: Behavior,
    delay: Option<Duration>,
    schedule_panics: bool,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl StubCrawler {
    pub fn new(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            next: Mutex::new(DateTime::<Utc>::MIN_UTC),
            behavior,
            delay: None,
            schedule_panics: false,
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }

    pub fn track(name: &str, title: &str, artist: &str) -> Self {
        Self::new(
            name,
            Behavior::Track {
                title: title.to_string(),
                artist: artist.to_string(),
            },
        )
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self::new(name, Behavior::Fail(message.to_string()))
    }

    pub fn panicking(name: &str, message: &str) -> Self {
        Self::new(name, Behavior::Panic(message.to_string()))
    }

    /// Sleep (tokio time) for `delay` inside every crawl.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Panic whenever asked for the next crawl time.
    pub fn with_broken_schedule(mut self) -> Self {
        self.schedule_panics = true;
        self
    }

    /// Not due until `at`.
    pub fn due_at(self, at: DateTime<Utc>) -> Self {
        *self.next.lock() = at;
        self
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Crawler for StubCrawler {
    async fn crawl(&self) -> Result<TrackInfo, CrawlError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);

        match &self.behavior {
            Behavior::Track { title, artist } => {
                Ok(TrackInfo::new(title.clone(), artist.clone(), self.name.clone()))
            }
            Behavior::Fail(message) => Err(CrawlError::other(message.clone())),
            Behavior::Panic(message) => panic!("{}", message),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn next_crawl_time(&self) -> DateTime<Utc> {
        if self.schedule_panics {
            panic!("schedule of {} is corrupt", self.name);
        }
        *self.next.lock()
    }
}

/// A writer that remembers everything it was handed.
#[derive(Default)]
pub struct RecordingWriter {
    tracks: Mutex<Vec<TrackInfo>>,
    delay: Option<Duration>,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep (tokio time) for `delay` before recording each write.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            tracks: Mutex::new(Vec::new()),
            delay: Some(delay),
        }
    }

    pub fn tracks(&self) -> Vec<TrackInfo> {
        self.tracks.lock().clone()
    }

    /// Poll until at least `count` tracks arrived or two (tokio) seconds pass.
    pub async fn wait_for(&self, count: usize) -> Vec<TrackInfo> {
        for _ in 0..200 {
            if self.tracks.lock().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.tracks()
    }
}

#[async_trait::async_trait]
impl Writer for RecordingWriter {
    async fn write(&self, track: TrackInfo) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.tracks.lock().push(track);
    }
}

/// Captured log output of the current thread's subscriber.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Route this thread's tracing output into a buffer. Only sees events from
/// tasks polled on this thread, so pair it with a current-thread runtime.
pub fn capture_logs() -> (tracing::subscriber::DefaultGuard, LogBuffer) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (tracing::subscriber::set_default(subscriber), buffer)
}
